//! Projection: clears every binding slot not named by the projection list.

use crate::query::{Bindings, VariableId};

/// A bitmap over variable ids naming the slots to keep.
#[derive(Debug, Clone)]
pub struct Project {
    keep: Vec<bool>,
}

impl Project {
    /// An empty projection over `width` variables; nothing is kept until
    /// [`Project::keep`] is called.
    pub fn new(width: usize) -> Self {
        Self {
            keep: vec![false; width],
        }
    }

    pub fn keep(&mut self, var: VariableId) {
        if let Some(slot) = self.keep.get_mut(var.get() as usize - 1) {
            *slot = true;
        }
    }

    pub(crate) fn apply(&self, bindings: &mut Bindings) {
        for (i, keep) in self.keep.iter().enumerate() {
            if !keep {
                if let Some(var) = VariableId::new(i as u32 + 1) {
                    bindings.clear(var);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TermId;

    #[test]
    fn clears_everything_not_kept() {
        let a = VariableId::new(1).unwrap();
        let b = VariableId::new(2).unwrap();
        let mut project = Project::new(2);
        project.keep(b);
        let mut bindings = Bindings::new(2);
        bindings.set(a, TermId::new(7).unwrap());
        bindings.set(b, TermId::new(8).unwrap());
        project.apply(&mut bindings);
        assert_eq!(None, bindings.get(a));
        assert_eq!(Some(TermId::new(8).unwrap()), bindings.get(b));
    }
}
