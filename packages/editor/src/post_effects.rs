//! Post-effect system.
//!
//! A structural mutation may require secondary writes to keep the
//! document consistent (inserting a verse renumbers the verses after
//! it). Effects analyze committed mutations and produce secondary
//! mutations that the editor applies synchronously, inside the same
//! outer transaction, tagged history-mergeable.
//!
//! Effects are deterministic and composable: the same mutation always
//! produces the same secondary writes.

use crate::operations::StructuralChange;
use crate::state::{EditorState, NodeKey};

/// Secondary write produced by a post-effect
#[derive(Debug, Clone, PartialEq)]
pub enum SecondaryMutation {
    SetVerseNumber { key: NodeKey, number: String },
}

pub trait PostEffect: std::fmt::Debug {
    /// Analyze one structural mutation against the post-mutation state
    /// and produce any secondary mutations it requires
    fn analyze(&self, change: &StructuralChange, state: &EditorState) -> Vec<SecondaryMutation>;
}

/// Applies every registered effect to every mutation
#[derive(Debug, Default)]
pub struct PostEffectEngine {
    effects: Vec<Box<dyn PostEffect>>,
}

impl PostEffectEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, effect: Box<dyn PostEffect>) {
        self.effects.push(effect);
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn analyze(
        &self,
        change: &StructuralChange,
        state: &EditorState,
    ) -> Vec<SecondaryMutation> {
        let mut secondary = Vec::new();
        for effect in &self.effects {
            secondary.extend(effect.analyze(change, state));
        }
        secondary
    }
}
