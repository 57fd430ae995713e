/// Single-select button group.
///
/// `current` is what the user picked; `displayed` is what the renderer
/// shows as selected. They only diverge after a reveal with a wrong pick.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoiceWidget<T> {
    values: Vec<T>,
    current: Option<T>,
    disabled: bool,
    revealed: Option<T>,
}

/// Per-value display state handed to the renderer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceMark {
    Default,
    Checked,
    /// the user's pick, revealed as wrong
    Wrong,
    /// the revealed correct value
    Correct,
}

impl<T: Clone + PartialEq> ChoiceWidget<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            current: None,
            disabled: false,
            revealed: None,
        }
    }

    /// Toggle `value`. Returns true when the selection changed.
    pub fn select(&mut self, value: &T) -> bool {
        if self.disabled || !self.values.contains(value) {
            return false;
        }
        if self.current.as_ref() == Some(value) {
            self.current = None;
        } else {
            self.current = Some(value.clone());
        }
        true
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn has_chosen(&self) -> bool {
        self.current.is_some()
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn reveal(&mut self, correct: T) {
        self.revealed = Some(correct);
        self.disable();
    }

    /// Restore a previous selection without side effects.
    pub fn preset(&mut self, value: Option<T>) {
        let Some(value) = value else {
            return;
        };
        if self.values.contains(&value) {
            self.current = Some(value);
        }
    }

    pub fn displayed(&self) -> Option<&T> {
        self.revealed.as_ref().or(self.current.as_ref())
    }

    pub fn revealed(&self) -> Option<&T> {
        self.revealed.as_ref()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.revealed
            .as_ref()
            .map(|correct| self.current.as_ref() == Some(correct))
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn mark_of(&self, value: &T) -> ChoiceMark {
        let picked = self.current.as_ref() == Some(value);
        match &self.revealed {
            Some(correct) if correct == value => ChoiceMark::Correct,
            Some(_) if picked => ChoiceMark::Wrong,
            Some(_) => ChoiceMark::Default,
            None if picked => ChoiceMark::Checked,
            None => ChoiceMark::Default,
        }
    }
}
