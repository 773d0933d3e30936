//! Key Generator Registry
//!
//! Maps entry type names (e.g. "file", "service") to the function that turns a
//! payload into its trie key. Types without a registered generator fall back to
//! the registry's default generator.

use super::types::TrieKey;

use dashmap::DashMap;
use std::sync::Arc;

/// Number of key bits produced by the default generator.
pub const DEFAULT_KEY_BITS: usize = 32;

/// Derives the trie key of a payload.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, payload: &str) -> TrieKey;
}

/// Order-preserving generator: every payload byte contributes its 8 bits,
/// most significant first, and the result is cut to `max_bits`.
///
/// Lexicographically ordered payloads map to ordered keys, so prefix queries on
/// payloads become subtree queries on the trie.
#[derive(Debug, Clone)]
pub struct BinaryKeyGenerator {
    max_bits: usize,
}

impl BinaryKeyGenerator {
    pub fn new(max_bits: usize) -> Self {
        Self { max_bits }
    }
}

impl Default for BinaryKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS)
    }
}

impl KeyGenerator for BinaryKeyGenerator {
    fn generate(&self, payload: &str) -> TrieKey {
        let bits: String = payload
            .bytes()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
            .take(self.max_bits)
            .map(|bit| if bit == 1 { '1' } else { '0' })
            .collect();

        // Only '0'/'1' are produced above.
        TrieKey::new(bits).unwrap_or_default()
    }
}

impl<F> KeyGenerator for F
where
    F: Fn(&str) -> TrieKey + Send + Sync,
{
    fn generate(&self, payload: &str) -> TrieKey {
        self(payload)
    }
}

/// Registry holding the key generator of every known entry type.
pub struct KeyRegistry {
    generators: DashMap<String, Arc<dyn KeyGenerator>>,
    fallback: Arc<dyn KeyGenerator>,
}

impl KeyRegistry {
    /// Creates a registry whose fallback is the order-preserving generator.
    pub fn new(key_bits: usize) -> Arc<Self> {
        Arc::new(Self {
            generators: DashMap::new(),
            fallback: Arc::new(BinaryKeyGenerator::new(key_bits)),
        })
    }

    /// Registers the generator used for entries of `type_name`.
    pub fn register<G>(&self, type_name: &str, generator: G)
    where
        G: KeyGenerator + 'static,
    {
        self.generators
            .insert(type_name.to_string(), Arc::new(generator));

        tracing::info!("Registered key generator for type: {}", type_name);
    }

    pub fn generate(&self, type_name: &str, payload: &str) -> TrieKey {
        match self.generators.get(type_name) {
            Some(generator) => generator.value().generate(payload),
            None => self.fallback.generate(payload),
        }
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self {
            generators: DashMap::new(),
            fallback: Arc::new(BinaryKeyGenerator::default()),
        }
    }
}
