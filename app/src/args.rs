//! Command-line arguments.
//!
//! Deliberately small: a list of identifiers plus a handful of flags.
//!
//! ```text
//! plugaudit [--search <kw>] [--category <name>] [--estimate]
//!           [--save | --nosave] [--cleanup] [--clear-sources]
//!           [--init-config] [slug ...]
//! ```

use anyhow::{bail, Result};

/// Usage line printed when there is nothing to do.
pub const USAGE: &str = "usage: plugaudit [--search <kw>] [--category <name>] [--estimate] \
                         [--save | --nosave] [--cleanup] [--clear-sources] \
                         [--init-config] [slug ...]";

/// Parsed invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Identifiers given explicitly, in order
    pub slugs: Vec<String>,
    /// Keyword to discover more identifiers with
    pub search: Option<String>,
    /// Category listing to discover more identifiers from
    pub category: Option<String>,
    /// Only estimate the size of the search/category listing
    pub estimate: bool,
    /// Override for `pipeline.save_sources`
    pub save_sources: Option<bool>,
    /// Prune archived sources without a `Match` verdict after the run
    pub cleanup: bool,
    /// Delete the whole source archive before auditing
    pub clear_sources: bool,
    /// Write a default config file rooted at the data directory and exit
    pub init_config: bool,
}

impl Invocation {
    /// Parse arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Self::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--search=") {
                invocation.search = Some(value.to_string());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--category=") {
                invocation.category = Some(value.to_string());
                continue;
            }
            match arg.as_str() {
                "--search" => match args.next() {
                    Some(value) => invocation.search = Some(value),
                    None => bail!("--search requires a keyword"),
                },
                "--category" => match args.next() {
                    Some(value) => invocation.category = Some(value),
                    None => bail!("--category requires a name"),
                },
                "--estimate" => invocation.estimate = true,
                "--save" => invocation.save_sources = Some(true),
                "--nosave" => invocation.save_sources = Some(false),
                "--cleanup" => invocation.cleanup = true,
                "--clear-sources" => invocation.clear_sources = true,
                "--init-config" => invocation.init_config = true,
                flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
                slug => invocation.slugs.push(slug.to_string()),
            }
        }

        Ok(invocation)
    }

    /// Whether discovery has to run before auditing.
    #[must_use]
    pub fn discovers(&self) -> bool {
        self.search.is_some() || self.category.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_and_flags() {
        let inv = Invocation::parse(["foo", "--nosave", "bar", "--search", "upload"])
            .expect("parse");
        assert_eq!(inv.slugs, vec!["foo", "bar"]);
        assert_eq!(inv.search.as_deref(), Some("upload"));
        assert_eq!(inv.save_sources, Some(false));
        assert!(inv.discovers());
    }

    #[test]
    fn test_equals_forms() {
        let inv = Invocation::parse(["--search=file manager", "--category=popular", "--estimate"])
            .expect("parse");
        assert_eq!(inv.search.as_deref(), Some("file manager"));
        assert_eq!(inv.category.as_deref(), Some("popular"));
        assert!(inv.estimate);
        assert!(inv.slugs.is_empty());
    }

    #[test]
    fn test_last_save_flag_wins() {
        let inv = Invocation::parse(["--nosave", "--save"]).expect("parse");
        assert_eq!(inv.save_sources, Some(true));
    }

    #[test]
    fn test_maintenance_flags() {
        let inv = Invocation::parse(["--clear-sources", "--cleanup", "foo"]).expect("parse");
        assert!(inv.clear_sources);
        assert!(inv.cleanup);
        assert!(!inv.init_config);
        assert_eq!(inv.slugs, vec!["foo"]);

        let inv = Invocation::parse(["--init-config"]).expect("parse");
        assert!(inv.init_config);
        assert!(inv.slugs.is_empty());
    }

    #[test]
    fn test_missing_value_and_unknown_flag() {
        assert!(Invocation::parse(["--search"]).is_err());
        assert!(Invocation::parse(["--category"]).is_err());
        let err = Invocation::parse(["--frobnicate"]).expect_err("unknown flag");
        assert!(err.to_string().contains("--frobnicate"));
    }

    #[test]
    fn test_empty() {
        let inv = Invocation::parse(Vec::<String>::new()).expect("parse");
        assert_eq!(inv, Invocation::default());
        assert!(!inv.discovers());
    }
}
