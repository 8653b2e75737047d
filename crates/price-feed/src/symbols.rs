//! Pair to upstream symbol mapping
//!
//! Kraken names Bitcoin `XBT` and may answer a ticker query under an
//! alternate key (`XXBTZUSD` for a request of `XBTUSD`), so each symbol
//! carries the list of response keys to try.

use std::collections::HashMap;
use std::sync::LazyLock;

use ltp_core::{Pair, Symbol};

/// One whitelist row
#[derive(Debug, Clone)]
pub struct PairMapping {
    pub pair: Pair,
    pub symbol: Symbol,
    pub response_keys: Vec<String>,
}

impl PairMapping {
    pub fn new(pair: &str, symbol: &str, response_keys: &[&str]) -> Self {
        Self {
            pair: Pair::from(pair),
            symbol: Symbol::from(symbol),
            response_keys: response_keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Static whitelist of supported pairs
static KRAKEN_MAPPER: LazyLock<SymbolMapper> = LazyLock::new(|| {
    SymbolMapper::new(vec![
        PairMapping::new("BTC/USD", "XBTUSD", &["XBTUSD", "XXBTZUSD"]),
        PairMapping::new("BTC/CHF", "XBTCHF", &["XBTCHF", "XXBTZCHF"]),
        PairMapping::new("BTC/EUR", "XBTEUR", &["XBTEUR", "XXBTZEUR"]),
    ])
});

/// Immutable pair/symbol lookup table
#[derive(Debug, Clone)]
pub struct SymbolMapper {
    pairs: Vec<Pair>,
    pair_to_symbol: HashMap<Pair, Symbol>,
    symbols: Vec<Symbol>,
    response_keys: HashMap<Symbol, Vec<String>>,
}

impl SymbolMapper {
    /// Build a mapper; later rows for an already-seen pair are ignored
    pub fn new(mappings: Vec<PairMapping>) -> Self {
        let mut pairs = Vec::with_capacity(mappings.len());
        let mut pair_to_symbol = HashMap::with_capacity(mappings.len());
        let mut symbols = Vec::new();
        let mut response_keys: HashMap<Symbol, Vec<String>> = HashMap::new();

        for mapping in mappings {
            if pair_to_symbol.contains_key(&mapping.pair) {
                continue;
            }

            let keys = response_keys.entry(mapping.symbol.clone()).or_insert_with(|| {
                symbols.push(mapping.symbol.clone());
                Vec::new()
            });
            for key in mapping.response_keys {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }

            pairs.push(mapping.pair.clone());
            pair_to_symbol.insert(mapping.pair, mapping.symbol);
        }

        Self {
            pairs,
            pair_to_symbol,
            symbols,
            response_keys,
        }
    }

    /// The Kraken whitelist
    pub fn kraken() -> &'static SymbolMapper {
        &KRAKEN_MAPPER
    }

    pub fn is_supported(&self, pair: &Pair) -> bool {
        self.pair_to_symbol.contains_key(pair)
    }

    pub fn map_to_symbol(&self, pair: &Pair) -> Option<&Symbol> {
        self.pair_to_symbol.get(pair)
    }

    /// Every distinct symbol in whitelist order
    pub fn all_symbols(&self) -> Vec<Symbol> {
        self.symbols.clone()
    }

    /// Every supported pair in whitelist order
    pub fn supported_pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Alternate keys the upstream may use for `symbol` in its response
    pub fn response_keys(&self, symbol: &Symbol) -> &[String] {
        self.response_keys
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for SymbolMapper {
    fn default() -> Self {
        Self::kraken().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kraken_whitelist() {
        let mapper = SymbolMapper::kraken();

        assert!(mapper.is_supported(&Pair::from("BTC/USD")));
        assert!(!mapper.is_supported(&Pair::from("XYZ/ABC")));
        assert_eq!(
            mapper.map_to_symbol(&Pair::from("BTC/EUR")),
            Some(&Symbol::from("XBTEUR"))
        );
        assert_eq!(mapper.map_to_symbol(&Pair::from("ETH/USD")), None);
    }

    #[test]
    fn test_deterministic_order() {
        let mapper = SymbolMapper::kraken();

        assert_eq!(
            mapper.all_symbols(),
            vec![Symbol::from("XBTUSD"), Symbol::from("XBTCHF"), Symbol::from("XBTEUR")]
        );
        assert_eq!(
            mapper.supported_pairs(),
            &[Pair::from("BTC/USD"), Pair::from("BTC/CHF"), Pair::from("BTC/EUR")]
        );
    }

    #[test]
    fn test_response_keys() {
        let mapper = SymbolMapper::kraken();

        assert_eq!(
            mapper.response_keys(&Symbol::from("XBTUSD")),
            &["XBTUSD".to_string(), "XXBTZUSD".to_string()]
        );
        assert!(mapper.response_keys(&Symbol::from("ETHUSD")).is_empty());
    }

    #[test]
    fn test_shared_symbol() {
        let mapper = SymbolMapper::new(vec![
            PairMapping::new("BTC/USD", "XBTUSD", &["XBTUSD"]),
            PairMapping::new("XBT/USD", "XBTUSD", &["XXBTZUSD"]),
            PairMapping::new("BTC/EUR", "XBTEUR", &[]),
        ]);

        assert_eq!(
            mapper.all_symbols(),
            vec![Symbol::from("XBTUSD"), Symbol::from("XBTEUR")],
            "Symbols shared by several pairs should be listed once"
        );
        assert_eq!(mapper.supported_pairs().len(), 3);
        assert_eq!(
            mapper.response_keys(&Symbol::from("XBTUSD")),
            &["XBTUSD".to_string(), "XXBTZUSD".to_string()]
        );
    }
}
