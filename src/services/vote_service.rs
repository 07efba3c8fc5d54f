use std::collections::HashMap;

use tracing::info;

use crate::{
    dao::{
        cache::{CacheTtl, keys},
        document_store::{DocumentQuery, Documents},
        models::{VoteEntity, vote_key},
    },
    dto::vote::{CastVoteRequest, NomineeTally, VoteReceipt, VoteTally},
    error::ServiceError,
    realtime::TournamentEvent,
    services::{
        realtime_service, room_service, tournament_service,
        xp_service::{self, XpReward},
    },
    state::SharedState,
};

/// Count ballots per nominee, most voted first and nominee id as tie-break.
pub fn tally(slug: &str, category: &str, votes: &[VoteEntity]) -> VoteTally {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.nominee_id.as_str()).or_default() += 1;
    }
    let total = votes.len() as u64;

    let mut results = counts
        .into_iter()
        .map(|(nominee_id, votes)| NomineeTally {
            nominee_id: nominee_id.to_string(),
            votes,
            percentage: (votes as f64 * 1000.0 / total as f64).round() / 10.0,
        })
        .collect::<Vec<_>>();
    results.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.nominee_id.cmp(&b.nominee_id)));

    VoteTally {
        tournament_slug: slug.to_string(),
        category: category.to_string(),
        total_votes: total,
        results,
    }
}

async fn load_votes(documents: &Documents, slug: &str, category: &str) -> Result<Vec<VoteEntity>, ServiceError> {
    Ok(documents
        .query(
            DocumentQuery::for_document::<VoteEntity>()
                .filter("tournament_slug", slug)
                .filter("category", category),
        )
        .await?)
}

/// Record the ballot of `voter_id`; a second vote in the same category replaces the first.
pub async fn cast_vote(
    state: &SharedState,
    voter_id: &str,
    request: CastVoteRequest,
) -> Result<VoteReceipt, ServiceError> {
    let documents = state.require_documents().await?;
    let slug = request.tournament_slug;
    let category = request.category.trim().to_ascii_lowercase();
    tournament_service::load_tournament(state, &documents, &slug).await?;

    let replaced = documents
        .get::<VoteEntity>(&vote_key(&slug, &category, voter_id))
        .await?
        .is_some();
    let vote = VoteEntity {
        tournament_slug: slug.clone(),
        category: category.clone(),
        voter_id: voter_id.to_string(),
        nominee_id: request.nominee_id,
        cast_at: state.clock().now(),
    };
    documents.upsert(&vote).await?;

    let votes = load_votes(&documents, &slug, &category).await?;
    let current = tally(&slug, &category, &votes);
    state
        .cache()
        .set(&keys::vote_tally(&slug, &category), &current, CacheTtl::VoteTally)
        .await;

    if !replaced {
        xp_service::award_best_effort(state, &documents, voter_id, &[XpReward::VoteCast]).await;
    }
    info!(slug = %slug, category = %category, voter_id, replaced, "vote cast");
    realtime_service::publish(
        state,
        &room_service::tournament_room(&slug),
        TournamentEvent::VoteCast {
            category: category.clone(),
            total_votes: current.total_votes,
        },
    );

    Ok(VoteReceipt {
        tournament_slug: slug,
        category,
        nominee_id: vote.nominee_id,
        replaced,
        total_votes: current.total_votes,
    })
}

/// Current results of one category, cache-warmed.
pub async fn results(state: &SharedState, slug: &str, category: &str) -> Result<VoteTally, ServiceError> {
    let documents = state.require_documents().await?;
    tournament_service::load_tournament(state, &documents, slug).await?;
    let category = category.trim().to_ascii_lowercase();
    state
        .cache()
        .get_or_load(&keys::vote_tally(slug, &category), CacheTtl::VoteTally, || async {
            let votes = load_votes(&documents, slug, &category).await?;
            Ok::<_, ServiceError>(tally(slug, &category, &votes))
        })
        .await
}
