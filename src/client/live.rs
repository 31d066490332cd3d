//! Incremental display of a growing answer.

/// How to bring the display up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redraw {
    /// Write this text after what is shown.
    Append(String),
    /// Clear what is shown and write this text instead.
    Replace(String),
}

/// Tracks the answer text on screen.
///
/// Partial decodes usually only grow, but can shrink, e.g. when a trailing
/// quote turns out to be the start of the sources field.
#[derive(Debug, Default)]
pub struct LiveText {
    shown: String,
}

impl LiveText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest text and return the change to draw, if any.
    pub fn update(&mut self, text: &str) -> Option<Redraw> {
        if text == self.shown {
            return None;
        }

        let redraw = match text.strip_prefix(self.shown.as_str()) {
            Some(added) => Redraw::Append(added.to_string()),
            None => Redraw::Replace(text.to_string()),
        };
        self.shown = text.to_string();
        Some(redraw)
    }

    /// Text currently on screen.
    pub fn shown(&self) -> &str {
        &self.shown
    }

    /// Number of line breaks in the shown text.
    pub fn line_breaks(&self) -> usize {
        self.shown.matches('\n').count()
    }
}
