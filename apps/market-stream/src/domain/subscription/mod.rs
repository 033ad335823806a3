//! Subscription Descriptors
//!
//! Domain types describing which instruments the client subscribes to and
//! which market data fields it requests for each. The configured set is
//! fixed at startup and reissued verbatim on every successful connection,
//! in configured order.

use serde::{Deserialize, Serialize};

/// A contract symbol string (e.g. `F.US.ES`).
pub type Symbol = String;

/// Market data field requested in a subscription.
///
/// Serialized with the exact spelling the hub expects in the
/// `SubscribeSymbols` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketField {
    /// Last traded price.
    LastPrice,
    /// Best bid price.
    Bid,
    /// Best ask price.
    Ask,
    /// Traded volume.
    Volume,
}

impl MarketField {
    /// All fields, in the order they appear in the tick sink.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::LastPrice, Self::Bid, Self::Ask, Self::Volume]
    }

    /// Field name as it appears on the wire and in the CSV header.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LastPrice => "LastPrice",
            Self::Bid => "Bid",
            Self::Ask => "Ask",
            Self::Volume => "Volume",
        }
    }
}

/// Describes one instrument subscription: a stable symbol identifier, a
/// human-readable name, and the fields requested for it.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSubscription {
    symbol: Symbol,
    name: String,
    fields: Vec<MarketField>,
}

impl InstrumentSubscription {
    /// Create a descriptor requesting all market fields.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            fields: MarketField::all().to_vec(),
        }
    }

    /// Replace the requested field list.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<MarketField>) -> Self {
        self.fields = fields;
        self
    }

    /// The stable symbol identifier.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The human-readable contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The requested fields, in request order.
    #[must_use]
    pub fn fields(&self) -> &[MarketField] {
        &self.fields
    }
}

/// The ordered, startup-fixed set of instrument subscriptions.
///
/// An empty set is valid: the client connects and receives nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet(Vec<InstrumentSubscription>);

impl SubscriptionSet {
    /// Create a set from descriptors, preserving order.
    #[must_use]
    pub fn new(subscriptions: Vec<InstrumentSubscription>) -> Self {
        Self(subscriptions)
    }

    /// Iterate descriptors in configured order.
    pub fn iter(&self) -> std::slice::Iter<'_, InstrumentSubscription> {
        self.0.iter()
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a InstrumentSubscription;
    type IntoIter = std::slice::Iter<'a, InstrumentSubscription>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<InstrumentSubscription> for SubscriptionSet {
    fn from_iter<T: IntoIterator<Item = InstrumentSubscription>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_to_all_fields() {
        let sub = InstrumentSubscription::new("F.US.ES", "E-mini S&P");
        assert_eq!(sub.symbol(), "F.US.ES");
        assert_eq!(sub.name(), "E-mini S&P");
        assert_eq!(sub.fields(), MarketField::all());
    }

    #[test]
    fn descriptor_with_custom_fields() {
        let sub = InstrumentSubscription::new("F.US.NQ", "E-mini Nasdaq-100")
            .with_fields(vec![MarketField::LastPrice]);
        assert_eq!(sub.fields(), &[MarketField::LastPrice]);
    }

    #[test]
    fn field_serializes_with_wire_spelling() {
        let json = serde_json::to_string(&MarketField::LastPrice).unwrap();
        assert_eq!(json, r#""LastPrice""#);
        let json = serde_json::to_string(&MarketField::Bid).unwrap();
        assert_eq!(json, r#""Bid""#);
    }

    #[test]
    fn set_preserves_order() {
        let set = SubscriptionSet::new(vec![
            InstrumentSubscription::new("F.US.ES", "E-mini S&P"),
            InstrumentSubscription::new("F.US.NQ", "E-mini Nasdaq-100"),
            InstrumentSubscription::new("F.US.GC", "Gold Futures"),
        ]);
        let symbols: Vec<&str> = set.iter().map(InstrumentSubscription::symbol).collect();
        assert_eq!(symbols, ["F.US.ES", "F.US.NQ", "F.US.GC"]);
    }

    #[test]
    fn empty_set_is_valid() {
        let set = SubscriptionSet::default();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }
}
