//! Closed set of families, fixed at startup.

use crate::models::{FamilyId, FamilyProfile};
use crate::services::AuthError;

#[derive(Debug, Clone)]
pub struct FamilyDirectory {
    families: Vec<FamilyProfile>,
}

impl FamilyDirectory {
    /// Build from identifiers such as `["bull", "north"]`. Order is kept for listings.
    pub fn new<I, S>(names: I, site_base_url: &str) -> Result<Self, anyhow::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut families: Vec<FamilyProfile> = Vec::new();

        for name in names {
            let id = name.as_ref().trim().to_ascii_lowercase();
            if id.is_empty() {
                continue;
            }
            if !FamilyId::is_well_formed(&id) {
                anyhow::bail!(
                    "Invalid family identifier '{}': use lowercase letters, digits or '-'",
                    id
                );
            }
            if families.iter().any(|f| f.id.as_str() == id) {
                continue;
            }
            families.push(FamilyProfile::for_family(
                FamilyId::new_unchecked(id),
                site_base_url,
            ));
        }

        if families.is_empty() {
            anyhow::bail!("At least one family must be configured");
        }

        Ok(Self { families })
    }

    /// Map untrusted input onto a configured family.
    pub fn resolve(&self, raw: &str) -> Result<FamilyId, AuthError> {
        self.profile(raw)
            .map(|p| p.id.clone())
            .ok_or_else(|| AuthError::InvalidFamily(raw.chars().take(64).collect()))
    }

    pub fn profile(&self, raw: &str) -> Option<&FamilyProfile> {
        let wanted = raw.trim().to_ascii_lowercase();
        self.families.iter().find(|f| f.id.as_str() == wanted)
    }

    pub fn families(&self) -> &[FamilyProfile] {
        &self.families
    }
}
