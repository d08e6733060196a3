//! Zone arithmetic and zone geometry.
//!
//! Instanced neighbourhoods live in a reserved zone range. Each instance
//! spans 2000 ids: the lower half mirrors the default playground area and the
//! upper half mirrors the speedway area. Visibility data is only known for
//! the template ids, so a requested zone is folded back to its template
//! ([`canonical_zone_id`]), its visible neighbours are looked up there, and
//! each neighbour is mapped forward into the instance the client is in
//! ([`true_zone_id`]).

use crate::error::SchemaError;
use crate::types::ZoneId;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

/// Alias zone that stands for the default playground.
pub const WELCOME_VALLEY_TOKEN: ZoneId = 0;
/// Template hood of the lower half of an instance.
pub const TOONTOWN_CENTRAL: ZoneId = 2000;
/// Template hood of the upper half of an instance.
pub const GOOFY_SPEEDWAY: ZoneId = 8000;
/// First zone id reserved for instances.
pub const WELCOME_VALLEY_BEGIN: ZoneId = 22_000;
/// End (exclusive) of the instance range.
pub const WELCOME_VALLEY_END: ZoneId = 61_000;

const INSTANCE_SPAN: ZoneId = 2000;
const HOOD_SPAN: ZoneId = 1000;

fn is_instanced(zone_id: ZoneId) -> bool {
    (WELCOME_VALLEY_BEGIN..WELCOME_VALLEY_END).contains(&zone_id)
}

/// Hood (block of 1000 zones) a zone belongs to.
pub fn hood_id(zone_id: ZoneId) -> ZoneId {
    zone_id - zone_id % HOOD_SPAN
}

/// Street-level parent of a zone, e.g. 2200 for 2205.
pub fn branch_zone_id(zone_id: ZoneId) -> ZoneId {
    zone_id - zone_id % 100
}

/// Folds an instanced zone back to its template id.
///
/// The token zone maps to the default playground; ids outside the instance
/// range are returned unchanged.
pub fn canonical_zone_id(zone_id: ZoneId) -> ZoneId {
    if zone_id == WELCOME_VALLEY_TOKEN {
        return TOONTOWN_CENTRAL;
    }
    if !is_instanced(zone_id) {
        return zone_id;
    }
    let within = zone_id % INSTANCE_SPAN;
    if within < HOOD_SPAN {
        within + TOONTOWN_CENTRAL
    } else {
        within - HOOD_SPAN + GOOFY_SPEEDWAY
    }
}

/// Maps a template zone into the instance that `current_zone_id` lies in.
///
/// When the current zone is not instanced, the (canonicalised) zone is
/// returned as is.
pub fn true_zone_id(zone_id: ZoneId, current_zone_id: ZoneId) -> ZoneId {
    let zone_id = if is_instanced(zone_id) || zone_id == WELCOME_VALLEY_TOKEN {
        canonical_zone_id(zone_id)
    } else {
        zone_id
    };

    if !is_instanced(current_zone_id) {
        return zone_id;
    }
    let offset = current_zone_id - current_zone_id % INSTANCE_SPAN;
    match hood_id(zone_id) {
        TOONTOWN_CENTRAL => zone_id - TOONTOWN_CENTRAL + offset,
        GOOFY_SPEEDWAY => zone_id - GOOFY_SPEEDWAY + offset + HOOD_SPAN,
        _ => zone_id,
    }
}

/// Static map from a template zone to the zones always visible from it.
pub trait ZoneGeometry: Send + Sync {
    fn canonicalize(&self, zone_id: ZoneId) -> ZoneId {
        canonical_zone_id(zone_id)
    }

    /// Visible neighbours of a canonical zone, or `None` if it has no
    /// visibility data.
    fn neighbors(&self, canonical_zone_id: ZoneId) -> Option<&[ZoneId]>;

    /// Expands a client-requested zone into every zone the client must see.
    ///
    /// The quiet zone yields nothing.
    fn expand(&self, zone_id: ZoneId, out: &mut BTreeSet<ZoneId>) {
        if zone_id == crate::types::QUIET_ZONE {
            return;
        }
        out.insert(zone_id);
        if let Some(visibles) = self.neighbors(self.canonicalize(zone_id)) {
            for visible in visibles {
                let neighbor = true_zone_id(*visible, zone_id);
                out.insert(neighbor);
                out.insert(branch_zone_id(neighbor));
            }
            out.insert(branch_zone_id(zone_id));
        }
        out.remove(&crate::types::QUIET_ZONE);
    }
}

#[derive(Debug, Deserialize)]
struct VisGroupFile {
    #[serde(default)]
    visgroup: Vec<VisGroupEntry>,
}

#[derive(Debug, Deserialize)]
struct VisGroupEntry {
    zone: ZoneId,
    #[serde(default)]
    visibles: Vec<ZoneId>,
}

/// Visibility groups loaded from a TOML table.
///
/// ```toml
/// [[visgroup]]
/// zone = 2205
/// visibles = [2204, 2206]
/// ```
#[derive(Debug, Clone, Default)]
pub struct VisGroups {
    groups: HashMap<ZoneId, Vec<ZoneId>>,
}

impl VisGroups {
    /// Geometry with no visibility data; every zone stands alone.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let groups = Self::parse(&std::fs::read_to_string(path)?)?;
        info!("🗺️ Loaded {} visgroups from {}", groups.len(), path.display());
        Ok(groups)
    }

    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let file: VisGroupFile = toml::from_str(text)?;
        let groups = file
            .visgroup
            .into_iter()
            .map(|entry| (entry.zone, entry.visibles))
            .collect();
        Ok(Self { groups })
    }

    pub fn insert(&mut self, zone_id: ZoneId, visibles: Vec<ZoneId>) {
        self.groups.insert(zone_id, visibles);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl ZoneGeometry for VisGroups {
    fn neighbors(&self, canonical_zone_id: ZoneId) -> Option<&[ZoneId]> {
        self.groups.get(&canonical_zone_id).map(Vec::as_slice)
    }
}
