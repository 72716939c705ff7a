//! Mailbox metadata as learned from LIST.

use serde::{Deserialize, Serialize};

/// One mailbox's LIST record: decoded name, hierarchy separator, and the
/// server-advertised name attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MailboxMetadata {
    pub mailbox: String,
    /// Empty when the namespace is flat.
    pub separator: String,
    /// `\Noinferiors`, `\HasChildren`, `\Subscribed`, ... verbatim.
    pub flags: Vec<String>,
}

impl MailboxMetadata {
    pub fn new(mailbox: impl Into<String>, separator: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            separator: separator.into(),
            flags,
        }
    }

    fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag.eq_ignore_ascii_case(name))
    }

    /// Can this mailbox be SELECTed at all?
    pub fn is_selectable(&self) -> bool {
        !self.has_flag("\\Noselect") && !self.has_flag("\\Nonexistent")
    }

    /// Does the server say anything definite about child mailboxes?
    /// `None` means "ask the server".
    pub fn has_children(&self) -> Option<bool> {
        if self.has_flag("\\Noinferiors") || self.has_flag("\\HasNoChildren") {
            Some(false)
        } else if self.has_flag("\\HasChildren") {
            Some(true)
        } else {
            None
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.has_flag("\\Subscribed")
    }

    /// The last component of the hierarchical name.
    pub fn short_name(&self) -> &str {
        if self.separator.is_empty() {
            &self.mailbox
        } else {
            self.mailbox
                .rsplit(&self.separator)
                .next()
                .unwrap_or(&self.mailbox)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectability() {
        let plain = MailboxMetadata::new("INBOX", "/", vec![]);
        assert!(plain.is_selectable());

        let noselect = MailboxMetadata::new("parent", "/", vec!["\\Noselect".into()]);
        assert!(!noselect.is_selectable());
    }

    #[test]
    fn test_children_flags() {
        let unknown = MailboxMetadata::new("a", "/", vec![]);
        assert_eq!(unknown.has_children(), None);

        let none = MailboxMetadata::new("a", "/", vec!["\\HasNoChildren".into()]);
        assert_eq!(none.has_children(), Some(false));

        let some = MailboxMetadata::new("a", "/", vec!["\\HasChildren".into()]);
        assert_eq!(some.has_children(), Some(true));
    }

    #[test]
    fn test_short_name() {
        let nested = MailboxMetadata::new("work/lists/rust", "/", vec![]);
        assert_eq!(nested.short_name(), "rust");

        let flat = MailboxMetadata::new("archive.2024", "", vec![]);
        assert_eq!(flat.short_name(), "archive.2024");
    }
}
