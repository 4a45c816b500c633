//! `{{name}}` placeholder rendering for config values.

use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z_]+)\}\}").expect("placeholder pattern is valid"));

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

/// Placeholder names still present after rendering.
pub fn unresolved(rendered: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(rendered)
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_occurrence() {
        let out = render("{{env}}/{{role}}/{{env}}", &[("env", "production"), ("role", "web")]);
        assert_eq!(out, "production/web/production");
    }

    #[test]
    fn reports_unknown_placeholders() {
        let out = render("{{current_path}}/{{stage}}.conf", &[("current_path", "/srv/shop/current")]);
        assert_eq!(unresolved(&out), vec!["stage"]);
    }
}
