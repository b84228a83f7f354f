/// `godeploy <version>` line printed by the `version` subcommand.
fn version_line() -> String {
    format!("godeploy {}", env!("CARGO_PKG_VERSION"))
}

/// Print the CLI version.
pub(crate) fn version() {
    println!("{}", version_line());
}

#[cfg(test)]
mod tests {
    use super::version_line;

    #[test]
    fn version_line_names_the_package_version() {
        assert_eq!(version_line(), format!("godeploy {}", env!("CARGO_PKG_VERSION")));
        assert!(!env!("CARGO_PKG_VERSION").is_empty());
    }
}
