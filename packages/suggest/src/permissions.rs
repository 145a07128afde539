use serde::{Deserialize, Serialize};

use crate::suggestion::{Author, Suggestion};

/// Externally supplied capability of the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    View,
    Suggest,
    #[default]
    Edit,
}

impl AccessLevel {
    pub fn can_edit_directly(self) -> bool {
        self == AccessLevel::Edit
    }

    pub fn can_suggest(self) -> bool {
        self >= AccessLevel::Suggest
    }

    /// Suggest-only users cannot leave suggest mode
    pub fn locks_suggest_mode(self) -> bool {
        self == AccessLevel::Suggest
    }

    pub fn can_accept(self) -> bool {
        self == AccessLevel::Edit
    }

    /// Editors may reject anything; authors may withdraw their own suggestions
    pub fn can_reject(self, record: &Suggestion, author: Option<&Author>) -> bool {
        self == AccessLevel::Edit || author.is_some_and(|a| record.is_authored_by(&a.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionType;
    use chrono::Utc;

    #[test]
    fn test_levels() {
        assert!(!AccessLevel::View.can_suggest());
        assert!(AccessLevel::Suggest.can_suggest());
        assert!(AccessLevel::Suggest.locks_suggest_mode());
        assert!(!AccessLevel::Suggest.can_accept());
        assert!(AccessLevel::Edit.can_accept());
        assert!(AccessLevel::Edit.can_edit_directly());
    }

    #[test]
    fn test_reject_by_author_or_editor() {
        let ada = Author::new("ada", "Ada");
        let bob = Author::new("bob", "Bob");
        let record = Suggestion::new("s", SuggestionType::Insert, &ada, Utc::now());

        assert!(AccessLevel::Suggest.can_reject(&record, Some(&ada)));
        assert!(!AccessLevel::Suggest.can_reject(&record, Some(&bob)));
        assert!(!AccessLevel::Suggest.can_reject(&record, None));
        assert!(AccessLevel::Edit.can_reject(&record, Some(&bob)));
    }
}
