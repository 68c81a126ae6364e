//! Object key conventions.

/// Returns the last path segment of a key.
#[must_use]
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Normalizes an extension to carry exactly one leading dot.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.'))
}

/// Prefix under which a data service's canonical objects live.
///
/// Always ends with `/`.
#[must_use]
pub fn canonical_prefix(org: &str, source_name: &str, service: &str) -> String {
    format!("{org}/{source_name}/{service}/")
}

/// Canonical destination key `{org}/{source}/{service}/{filename}`.
#[must_use]
pub fn canonical_key(org: &str, source_name: &str, service: &str, source_key: &str) -> String {
    format!(
        "{}{}",
        canonical_prefix(org, source_name, service),
        basename(source_key)
    )
}

/// Prefix of the dated combined-artifact folder.
#[must_use]
pub fn artifact_prefix(deploy_env: &str, source_name: &str, date: &str) -> String {
    format!("csa/{deploy_env}/{source_name}/{date}/")
}

/// Location of a family of static grids.
///
/// Keys look like
/// `{branch}/{package}/static_grids/{kind}/{source}/{code}_{param}_{source}_{discriminator}{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGridLocation<'a> {
    /// Deployment branch.
    pub branch: &'a str,
    /// Package folder.
    pub package: &'a str,
    /// Grid kind (`extractor`, `geolocation`, ...).
    pub kind: &'a str,
    /// Source name.
    pub source_name: &'a str,
}

impl StaticGridLocation<'_> {
    /// The folder that holds every grid of this kind and source.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!(
            "{}/{}/static_grids/{}/{}/",
            self.branch, self.package, self.kind, self.source_name
        )
    }

    /// The filename prefix `{code}_{param}_{source}_`, lowercasing the code.
    #[must_use]
    pub fn name_prefix(&self, code: &str, param_short: &str) -> String {
        format!(
            "{}_{}_{}_",
            code.to_lowercase(),
            param_short,
            self.source_name
        )
    }
}

/// Picks the lexicographically greatest key whose basename starts with
/// `name_prefix` (if given) and ends with `extension` (if given).
pub fn select_latest<'a, I>(
    keys: I,
    name_prefix: Option<&str>,
    extension: Option<&str>,
) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let extension = extension.map(normalize_extension);
    keys.into_iter()
        .filter(|key| {
            let name = basename(key);
            name_prefix.map_or(true, |p| name.starts_with(p))
                && extension.as_deref().map_or(true, |e| name.ends_with(e))
        })
        .max_by(|a, b| basename(a).cmp(basename(b)).then_with(|| a.cmp(b)))
}
