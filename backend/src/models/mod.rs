//! Domain models shared by the repository, services and API.

pub mod condition;
pub mod context;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod user_role;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use condition::{Condition, ConditionError, ConditionSet};
pub use context::{PermissionContext, RequestMetadata};
pub use permission::{HttpAction, NewPermission, Permission, PermissionFilter, PermissionUpdate};
pub use role::{NewRole, Role, RoleFilter, RoleUpdate};
pub use role_permission::{
    NewRolePermission, RolePermission, RolePermissionFilter, RolePermissionUpdate,
};
pub use user_role::{NewUserRole, UserRole, UserRoleStatus};

/// Field of a partial update: left alone, cleared, or replaced.
///
/// Deserializes an absent field (with `#[serde(default)]`) as `Unset` and an
/// explicit JSON `null` as `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    /// Apply to the current value of an optional column.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Unset => current,
            Patch::Null => None,
            Patch::Value(v) => Some(v),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Unset => Patch::Unset,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(f(v)),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Value(v) => v.serialize(serializer),
            Patch::Unset | Patch::Null => serializer.serialize_none(),
        }
    }
}

/// Case-insensitive SQL `LIKE` pattern (`%`, `_`, `\` escape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikePattern(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Any,
    One,
    Lit(char),
}

impl LikePattern {
    /// Substring search for `term`; wildcards inside `term` are escaped.
    pub fn contains(term: &str) -> Self {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Self(pattern)
    }

    /// Normalize an optional search box value: blank means no filter.
    pub fn from_search(term: Option<&str>) -> Option<Self> {
        term.map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Self::contains)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Evaluate the pattern the way Postgres `ILIKE ... ESCAPE '\'` does.
    pub fn matches(&self, value: &str) -> bool {
        let tokens = self.tokens();
        let text: Vec<char> = value.chars().flat_map(char::to_lowercase).collect();

        let (mut t, mut s) = (0usize, 0usize);
        let mut backtrack: Option<(usize, usize)> = None;
        while s < text.len() {
            match tokens.get(t) {
                Some(LikeToken::Any) => {
                    backtrack = Some((t, s));
                    t += 1;
                }
                Some(LikeToken::One) => {
                    t += 1;
                    s += 1;
                }
                Some(LikeToken::Lit(c)) if *c == text[s] => {
                    t += 1;
                    s += 1;
                }
                _ => match backtrack {
                    Some((bt, bs)) => {
                        t = bt + 1;
                        s = bs + 1;
                        backtrack = Some((bt, bs + 1));
                    }
                    None => return false,
                },
            }
        }
        tokens[t.min(tokens.len())..]
            .iter()
            .all(|tok| *tok == LikeToken::Any)
    }

    fn tokens(&self) -> Vec<LikeToken> {
        let mut tokens = Vec::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            match c {
                '%' => tokens.push(LikeToken::Any),
                '_' => tokens.push(LikeToken::One),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        tokens.extend(escaped.to_lowercase().map(LikeToken::Lit));
                    }
                }
                other => tokens.extend(other.to_lowercase().map(LikeToken::Lit)),
            }
        }
        tokens
    }
}

/// Normalized pagination input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Unset or non-positive values fall back to page 1 / limit 20.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1).min(u32::MAX as i64) as u32;
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(Self::DEFAULT_LIMIT as i64)
            .min(Self::MAX_LIMIT as i64) as u32;
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            ((self.total as f64) / (self.limit as f64)).ceil() as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        description: Patch<String>,
    }

    #[test]
    fn test_patch_tri_state() {
        let absent: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, Patch::Unset);

        let null: Body = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(null.description, Patch::Null);

        let value: Body = serde_json::from_str(r#"{"description": "hi"}"#).unwrap();
        assert_eq!(value.description, Patch::Value("hi".to_string()));
    }

    #[test]
    fn test_patch_apply() {
        let current = Some("old".to_string());
        assert_eq!(Patch::Unset.apply(current.clone()), current);
        assert_eq!(Patch::<String>::Null.apply(current.clone()), None);
        assert_eq!(
            Patch::Value("new".to_string()).apply(current),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_like_pattern_contains() {
        let p = LikePattern::contains("own");
        assert_eq!(p.as_str(), "%own%");
        assert!(p.matches("owner"));
        assert!(p.matches("Listing OWNER"));
        assert!(!p.matches("realtor"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let p = LikePattern::contains("100%_done");
        assert_eq!(p.as_str(), r"%100\%\_done%");
        assert!(p.matches("task 100%_done today"));
        assert!(!p.matches("100 percent done"));
    }

    #[test]
    fn test_like_pattern_raw_wildcards() {
        let p = LikePattern("pend_ng%".into());
        assert!(p.matches("pending_email"));
        assert!(!p.matches("xpending"));
    }

    #[test]
    fn test_from_search_blank_is_none() {
        assert!(LikePattern::from_search(Some("   ")).is_none());
        assert!(LikePattern::from_search(None).is_none());
        assert_eq!(
            LikePattern::from_search(Some(" adm ")).unwrap().as_str(),
            "%adm%"
        );
    }

    #[test]
    fn test_page_request_defaults() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 20 });
        assert_eq!(
            PageRequest::new(Some(0), Some(-5)),
            PageRequest { page: 1, limit: 20 }
        );
        assert_eq!(
            PageRequest::new(Some(3), Some(500)),
            PageRequest { page: 3, limit: 100 }
        );
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<i32> = Page {
            items: vec![],
            total: 41,
            page: 1,
            limit: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
