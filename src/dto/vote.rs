use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Ballot for one award category.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    #[validate(length(min = 1, message = "Tournament is required"))]
    pub tournament_slug: String,
    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,
    #[validate(length(min = 1, message = "Nominee is required"))]
    pub nominee_id: String,
}

/// Acknowledgement of a recorded ballot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub tournament_slug: String,
    pub category: String,
    pub nominee_id: String,
    /// Whether an earlier ballot of the same voter was replaced.
    pub replaced: bool,
    pub total_votes: u64,
}

/// Votes received by one nominee.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NomineeTally {
    pub nominee_id: String,
    pub votes: u64,
    /// Share of all votes in percent, one decimal.
    pub percentage: f64,
}

/// Results of one category, most votes first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub tournament_slug: String,
    pub category: String,
    pub total_votes: u64,
    pub results: Vec<NomineeTally>,
}
