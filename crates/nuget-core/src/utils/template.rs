//! URI template expansion for service index resources.
//!
//! Resources such as `PackageDetailsUriTemplate` publish URLs like
//! `https://www.nuget.org/packages/{id}/{version}`. Only simple `{name}`
//! placeholders appear in practice, so expansion is plain substitution.

/// Replace `{name}` placeholders with the matching values.
///
/// Placeholders without a value are left intact so the caller can see what
/// is still missing.
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => output.push_str(value),
                    None => {
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                output.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);

    output
}

/// List the placeholder names in a template, in order of appearance
pub fn template_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else { break };
        names.push(&after[..close]);
        rest = &after[close + 1..];
    }

    names
}
