//! Slash-command parsing: `/name rest of the line` invokes a user-invocable
//! skill directly, bypassing free-form model routing.

/// Split a leading `/name` token off the rest of the message. Returns
/// `None` if `message` doesn't start with `/` or the name is empty.
pub fn parse_slash_invocation(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix('/')?;
    let (name, args) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
        None => (rest, ""),
    };
    if name.is_empty() {
        None
    } else {
        Some((name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_arguments() {
        assert_eq!(parse_slash_invocation("/deploy staging now"), Some(("deploy", "staging now")));
    }

    #[test]
    fn bare_name_has_empty_arguments() {
        assert_eq!(parse_slash_invocation("/status"), Some(("status", "")));
    }

    #[test]
    fn non_slash_message_is_not_an_invocation() {
        assert_eq!(parse_slash_invocation("hello /not-a-command"), None);
    }

    #[test]
    fn lone_slash_is_not_an_invocation() {
        assert_eq!(parse_slash_invocation("/"), None);
    }
}
