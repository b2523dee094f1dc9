//! Tool access control.
//!
//! A pure check of an agent's allow-list against a requested tool name.
//! Control tools never reach this check.

/// `None` allows everything; otherwise the name must be listed verbatim.
pub fn is_tool_allowed(allow_list: Option<&[String]>, name: &str) -> bool {
    match allow_list {
        None => true,
        Some(names) => names.iter().any(|allowed| allowed == name),
    }
}
