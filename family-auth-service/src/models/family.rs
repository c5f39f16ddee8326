//! Family identifiers and per-family branding.

use serde::Serialize;
use utoipa::ToSchema;

/// A family identifier that has been checked against the configured directory.
///
/// Values are lowercase ASCII alphanumerics or `-`, so they never contain the
/// `:` used to join a family to its CSRF token in the OAuth `state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, sqlx::Type, ToSchema)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FamilyId(String);

impl FamilyId {
    /// Only the directory and rows read back from storage build these.
    pub(crate) fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `raw` is syntactically a family identifier.
    pub fn is_well_formed(raw: &str) -> bool {
        !raw.is_empty()
            && raw.len() <= 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    }
}

impl std::fmt::Display for FamilyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FamilyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Display and email branding for one family archive.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FamilyProfile {
    pub id: FamilyId,
    pub display_name: String,
    #[serde(skip)]
    pub subject_prefix: String,
    pub description: String,
    pub site_url: String,
}

impl FamilyProfile {
    /// Branding for a family id, using the built-in copy for the known archives.
    pub fn for_family(id: FamilyId, site_base_url: &str) -> Self {
        let site_url = format!("{}/{}", site_base_url.trim_end_matches('/'), id.as_str());
        let title = title_case(id.as_str());

        let (subject_prefix, display_name, description) = match id.as_str() {
            "bull" => (
                "[Bull Family Archives]".to_string(),
                "Bull Family".to_string(),
                "Gladys Klingenberg's life story and Bull family history".to_string(),
            ),
            "north" => (
                "[North Family Archives]".to_string(),
                "North Family".to_string(),
                "North family genealogy and historical records".to_string(),
            ),
            "klingenberg" => (
                "[Klingenberg Family Archives]".to_string(),
                "Klingenberg Family".to_string(),
                "Klingenberg family heritage and genealogy".to_string(),
            ),
            "herrman" => (
                "[Herrman Family Archives]".to_string(),
                "Herrman Family".to_string(),
                "Herrman family history and genealogical records".to_string(),
            ),
            _ => (
                "[Family Archives]".to_string(),
                format!("{} Family", title),
                format!("{} family genealogy and records", title),
            ),
        };

        Self {
            id,
            display_name,
            subject_prefix,
            description,
            site_url,
        }
    }
}

fn title_case(id: &str) -> String {
    id.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_rejects_separator_and_case() {
        assert!(FamilyId::is_well_formed("north"));
        assert!(FamilyId::is_well_formed("van-der-berg"));
        assert!(!FamilyId::is_well_formed("north:bull"));
        assert!(!FamilyId::is_well_formed("North"));
        assert!(!FamilyId::is_well_formed(""));
    }

    #[test]
    fn known_family_uses_archive_branding() {
        let profile =
            FamilyProfile::for_family(FamilyId::new_unchecked("bull"), "https://family.example/");
        assert_eq!(profile.subject_prefix, "[Bull Family Archives]");
        assert_eq!(profile.site_url, "https://family.example/bull");
    }

    #[test]
    fn unknown_family_falls_back_to_generic_branding() {
        let profile =
            FamilyProfile::for_family(FamilyId::new_unchecked("van-der-berg"), "https://f.example");
        assert_eq!(profile.subject_prefix, "[Family Archives]");
        assert_eq!(profile.display_name, "Van Der Berg Family");
    }
}
