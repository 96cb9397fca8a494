//! Per-codec mapping from value types to wire encoders and decoders.
//!
//! A registry is filled with `&mut` access while a codec is being built and
//! is then shared behind an `Arc`, after which it can no longer change.

use crate::error::SerializationError;
use crate::value::TypeTag;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A wire format family: the shape of its type identifiers and of its
/// encode/decode functions.
pub trait WireFamily {
    /// Wire type identifier (e.g. `"g:Int32"` or a GraphBinary type code).
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync;
    type Encoder: Copy + Send + Sync;
    type Decoder: Copy + Send + Sync;

    /// Family name used in logs.
    const NAME: &'static str;
}

/// Serialization rule for one type.
pub struct Rule<F: WireFamily> {
    pub id: F::Id,
    pub encode: F::Encoder,
    pub decode: F::Decoder,
    /// Alternative encoders tried in order when `encode` fails.
    pub fallbacks: Vec<F::Encoder>,
}

impl<F: WireFamily> Clone for Rule<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            encode: self.encode,
            decode: self.decode,
            fallbacks: self.fallbacks.clone(),
        }
    }
}

impl<F: WireFamily> fmt::Debug for Rule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

/// Type-to-rule registry for one wire family.
pub struct SerializerRegistry<F: WireFamily> {
    rules: HashMap<TypeTag, Rule<F>>,
    ids: HashMap<F::Id, TypeTag>,
}

impl<F: WireFamily> SerializerRegistry<F> {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            ids: HashMap::new(),
        }
    }

    /// Registers the rule for `tag`, replacing any earlier one.
    pub fn register(&mut self, tag: TypeTag, id: F::Id, encode: F::Encoder, decode: F::Decoder) {
        tracing::debug!("[{}] Registering {} as {:?}", F::NAME, tag, id);

        if let Some(old) = self.rules.get(&tag) {
            if self.ids.get(&old.id) == Some(&tag) {
                self.ids.remove(&old.id);
            }
        }
        if let Some(previous) = self.ids.insert(id.clone(), tag.clone()) {
            if previous != tag {
                tracing::debug!("[{}] {:?} moved from {} to {}", F::NAME, id, previous, tag);
                self.rules.remove(&previous);
            }
        }
        self.rules.insert(
            tag,
            Rule {
                id,
                encode,
                decode,
                fallbacks: Vec::new(),
            },
        );
    }

    /// Appends an alternative encoder for an already registered type.
    pub fn register_fallback(
        &mut self,
        tag: &TypeTag,
        encode: F::Encoder,
    ) -> Result<(), SerializationError> {
        let rule = self
            .rules
            .get_mut(tag)
            .ok_or_else(|| SerializationError::UnregisteredType(tag.clone()))?;
        rule.fallbacks.push(encode);
        Ok(())
    }

    pub fn rule(&self, tag: &TypeTag) -> Result<&Rule<F>, SerializationError> {
        self.rules
            .get(tag)
            .ok_or_else(|| SerializationError::UnregisteredType(tag.clone()))
    }

    /// Type registered under wire identifier `id`.
    pub fn tag_for(&self, id: &F::Id) -> Option<&TypeTag> {
        self.ids.get(id)
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.rules.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.rules.keys()
    }
}

impl<F: WireFamily> Default for SerializerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: WireFamily> Clone for SerializerRegistry<F> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<F: WireFamily> fmt::Debug for SerializerRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("family", &F::NAME)
            .field("rules", &self.rules)
            .finish()
    }
}
