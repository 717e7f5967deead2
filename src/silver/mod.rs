// Silver layer - normalized, reference-resolved records keyed by natural key

pub mod models;
pub mod normalizer;
pub mod party_aggregator;

pub use models::{
    natural_key_id, SilverHerd, SilverHolding, SilverParty, SilverPartyRole, SilverPartyRoleRelationship,
};
pub use normalizer::{normalize_herds, normalize_holdings, normalize_parties, Normalized};
pub use party_aggregator::{aggregate_parties, MergedParty, SourceRole, HOLDER_ROLE_NAME};
