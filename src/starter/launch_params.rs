use crate::services::{LaunchParams, LaunchParamsModifier, LaunchParamsRequest, ModifierResult};

/// Ordered chain of layout modifiers.
#[derive(Default)]
pub struct LaunchParamsController {
    modifiers: Vec<Box<dyn LaunchParamsModifier>>,
}

impl LaunchParamsController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, modifier: Box<dyn LaunchParamsModifier>) {
        self.modifiers.push(modifier);
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Runs the chain in registration order, starting from `initial`.
    pub fn calculate(
        &mut self,
        request: &LaunchParamsRequest<'_>,
        initial: LaunchParams,
    ) -> LaunchParams {
        let mut current = initial;

        for modifier in &mut self.modifiers {
            let mut out = current.clone();
            match modifier.on_calculate(request, &current, &mut out) {
                ModifierResult::Skip => (),
                ModifierResult::Continue => current = out,
                ModifierResult::Done => {
                    current = out;
                    break;
                }
            }
        }

        trace!("launch params for {:?}: {current:?}", request.phase);
        current
    }
}

impl std::fmt::Debug for LaunchParamsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchParamsController")
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}
