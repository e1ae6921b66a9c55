use std::time::{
    Duration,
    Instant,
};

pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    shown_at: Instant,
}

/// Status banners; expired ones are dropped on [`Toasts::tick`].
#[derive(Debug)]
pub struct Toasts {
    lifetime: Duration,
    items: Vec<Toast>,
}

impl Default for Toasts {
    fn default() -> Self {
        Self::new(TOAST_LIFETIME)
    }
}

impl Toasts {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: ToastKind, text: impl Into<String>, now: Instant) {
        let text = text.into();
        // same message again just restarts its timer
        self.items.retain(|t| t.text != text);
        self.items.push(Toast {
            text,
            kind,
            shown_at: now,
        });
    }

    pub fn success(&mut self, text: impl Into<String>, now: Instant) {
        self.push(ToastKind::Success, text, now);
    }

    pub fn error(&mut self, text: impl Into<String>, now: Instant) {
        self.push(ToastKind::Error, text, now);
    }

    pub fn info(&mut self, text: impl Into<String>, now: Instant) {
        self.push(ToastKind::Info, text, now);
    }

    /// Drop expired toasts; returns whether anything changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let before = self.items.len();
        let lifetime = self.lifetime;
        self.items
            .retain(|t| now.saturating_duration_since(t.shown_at) < lifetime);
        before != self.items.len()
    }

    pub fn visible(&self) -> &[Toast] {
        &self.items
    }

    pub fn latest(&self) -> Option<&Toast> {
        self.items.last()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn tick__dismisses_after_lifetime() {
        // given
        let start = Instant::now();
        let mut toasts = Toasts::default();
        toasts.error("Connection error, please try again", start);

        // when
        let early = toasts.tick(start + Duration::from_millis(2999));
        let late = toasts.tick(start + TOAST_LIFETIME);

        // then
        assert!(!early);
        assert!(late);
        assert!(toasts.visible().is_empty());
    }

    #[test]
    fn push__repeated_text_restarts_timer() {
        let start = Instant::now();
        let mut toasts = Toasts::default();
        toasts.info("Saved", start);
        toasts.info("Saved", start + Duration::from_secs(2));

        toasts.tick(start + Duration::from_secs(4));

        assert_eq!(toasts.visible().len(), 1);
        assert_eq!(toasts.latest().unwrap().kind, ToastKind::Info);
    }
}
