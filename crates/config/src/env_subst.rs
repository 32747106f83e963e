/// Replace `${ENV_VAR}` placeholders in raw config text before parsing.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(len) = after.find('}') else {
            // Unterminated: the remainder is literal text.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..len];
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 2 + len + 1]),
        }
        rest = &after[len + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        assert_eq!(substitute_env("search = ${PATH};"), format!("search = {path};"));
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env("api_key = \"${RECALL_NONEXISTENT_XYZ}\""),
            "api_key = \"${RECALL_NONEXISTENT_XYZ}\""
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env("url = ${BASE"), "url = ${BASE");
        assert_eq!(substitute_env("cost: $5 {x}"), "cost: $5 {x}");
        assert_eq!(substitute_env("empty ${} stays"), "empty ${} stays");
    }
}
