//! Identity resolution with a per-run cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ownersync_core::{IdentityId, IdentityRef, IdentityRole, Naming, ResourceKind};
use ownersync_platform::PlatformClient;

use crate::error::ReconcileError;

/// Turns [`IdentityRef`]s into platform ids for one role.
///
/// Construct one per run; the cache lives exactly as long as the resolver,
/// so a reference maps to the same id for the whole run and never beyond it.
pub struct IdentityResolver<'a, C: PlatformClient + ?Sized> {
    client: &'a C,
    kind: ResourceKind,
    naming: Naming,
    role: IdentityRole,
    cache: HashMap<IdentityRef, IdentityId>,
}

impl<'a, C: PlatformClient + ?Sized> IdentityResolver<'a, C> {
    /// `@@` references are looked up as groups of `kind`, named by `naming`.
    pub fn new(client: &'a C, kind: ResourceKind, naming: Naming, role: IdentityRole) -> Self {
        Self {
            client,
            kind,
            naming,
            role,
            cache: HashMap::new(),
        }
    }

    pub fn role(&self) -> IdentityRole {
        self.role
    }

    /// Number of references resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn resolve(&mut self, reference: &IdentityRef) -> Result<IdentityId, ReconcileError> {
        if let Some(id) = self.cache.get(reference) {
            tracing::debug!("identity {reference} found in cache");
            return Ok(id.clone());
        }

        tracing::debug!("resolving identity {reference}");
        let (identity, looked_up) = if reference.is_group() {
            let display_name = self.naming.display_name(reference.as_str());
            let identity = self.client.find_group(self.kind, &display_name)?;
            (identity, format!("{} {display_name:?}", self.kind))
        } else {
            let identity = self.client.find_user(reference.as_str())?;
            (identity, "user".to_owned())
        };

        let identity = identity.ok_or_else(|| ReconcileError::Resolution {
            reference: reference.clone(),
            looked_up,
        })?;
        let id = identity.for_role(self.role).clone();
        self.cache.insert(reference.clone(), id.clone());
        Ok(id)
    }

    /// Resolve every reference, keeping track of which reference produced
    /// which id.
    pub fn resolve_all<'r>(
        &mut self,
        references: impl IntoIterator<Item = &'r IdentityRef>,
    ) -> Result<BTreeMap<IdentityId, IdentityRef>, ReconcileError> {
        let mut out = BTreeMap::new();
        for reference in references {
            let id = self.resolve(reference)?;
            out.insert(id, reference.clone());
        }
        Ok(out)
    }

    /// [`resolve_all`](Self::resolve_all) without the back-mapping.
    pub fn resolve_set<'r>(
        &mut self,
        references: impl IntoIterator<Item = &'r IdentityRef>,
    ) -> Result<BTreeSet<IdentityId>, ReconcileError> {
        Ok(self.resolve_all(references)?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use ownersync_core::Identity;
    use ownersync_platform::fake::{group_descriptor, group_id, FakePlatform};

    use super::*;

    fn r(s: &str) -> IdentityRef {
        IdentityRef::from(s)
    }

    #[test]
    fn second_resolution_hits_cache() {
        let fake = FakePlatform::new().with_user("a@x.com");
        let mut resolver = IdentityResolver::new(
            &fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Reviewer,
        );

        let first = resolver.resolve(&r("a@x.com")).expect("resolve");
        let second = resolver.resolve(&r("a@x.com")).expect("resolve");
        assert_eq!(first, second);
        assert_eq!(fake.user_lookups(), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn group_marker_uses_naming_convention() {
        let fake =
            FakePlatform::new().with_group(ResourceKind::SecurityGroup, "db-codeowners", &[]);
        let mut resolver = IdentityResolver::new(
            &fake,
            ResourceKind::SecurityGroup,
            Naming::default(),
            IdentityRole::Reviewer,
        );
        let id = resolver.resolve(&r("@@db")).expect("resolve group");
        assert_eq!(id, group_id("db-codeowners"));
        assert_eq!(fake.group_lookups(), 1);
        assert_eq!(fake.user_lookups(), 0);
    }

    #[test]
    fn role_selects_platform_field() {
        let identity = Identity {
            descriptor: IdentityId::from("aad.desc"),
            id: IdentityId::from("storage-key"),
        };
        let fake = FakePlatform::new()
            .with_user_identity("a@x.com", identity)
            .with_group(ResourceKind::Team, "db-codeowners", &[]);

        let mut members = IdentityResolver::new(
            &fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Member,
        );
        assert_eq!(members.resolve(&r("a@x.com")).expect("member").as_str(), "aad.desc");
        assert_eq!(members.resolve(&r("@@db")).expect("group"), group_descriptor("db-codeowners"));

        let mut reviewers = IdentityResolver::new(
            &fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Reviewer,
        );
        assert_eq!(reviewers.resolve(&r("a@x.com")).expect("reviewer").as_str(), "storage-key");
    }

    #[test]
    fn unknown_user_is_resolution_error_and_not_cached() {
        let fake = FakePlatform::new();
        let mut resolver = IdentityResolver::new(
            &fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Member,
        );

        let err = resolver.resolve(&r("ghost@x.com")).unwrap_err();
        assert!(matches!(err, ReconcileError::Resolution { .. }), "got: {err}");
        assert!(err.to_string().contains("ghost@x.com"));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn unknown_group_names_formatted_lookup() {
        let fake = FakePlatform::new();
        let mut resolver = IdentityResolver::new(
            &fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Member,
        );
        let err = resolver.resolve(&r("@@nope")).unwrap_err();
        assert!(err.to_string().contains("nope-codeowners"), "got: {err}");
    }
}
