/// What the edit dialog asks the rack to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Rename to the trimmed input (ignored by the rack if blank)
    Rename(String),
    /// Reset the position to empty
    Clear,
    /// Close without changes
    Cancel,
}

/// Rename/clear dialog opened by a long press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDialog {
    index: usize,
    input: String,
}

impl EditDialog {
    pub const TITLE: &'static str = "Edit Spice";
    pub const PLACEHOLDER: &'static str = "Enter New Spice Name";
    pub const CLEAR_LABEL: &'static str = "Clear Spice Position";

    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            input: String::new(),
        }
    }

    /// Position being edited
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replaces the text field
    pub fn set_input(&mut self, text: &str) {
        self.input.clear();
        self.input.push_str(text);
    }

    /// OK button
    #[must_use]
    pub fn accept(self) -> EditAction {
        EditAction::Rename(self.input.trim().to_owned())
    }

    #[must_use]
    pub fn clear(self) -> EditAction {
        EditAction::Clear
    }

    #[must_use]
    pub fn cancel(self) -> EditAction {
        EditAction::Cancel
    }

    /// One-line prompt for the console
    #[must_use]
    pub fn render(&self) -> String {
        let field = if self.input.is_empty() {
            format!("<{}>", Self::PLACEHOLDER)
        } else {
            self.input.clone()
        };
        format!(
            "{} POS {}: [{field}]  (name TEXT | ok | clear = {} | cancel)",
            Self::TITLE,
            self.index,
            Self::CLEAR_LABEL
        )
    }
}
