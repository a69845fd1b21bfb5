//! Publish-failure classification.
//!
//! Stateless mapping from root-caused publish errors onto the two-way
//! taxonomy. Poison pills are failures no retry can fix (bad payloads,
//! schema rejections, oversized records); everything else is a system
//! failure, including anything unrecognized, because a wasted retry is
//! cheap while a false quarantine loses data.

use crate::domain::Classification;
use crate::port::bus::PublishError;

/// Classify a publish failure and render its reason string.
pub fn classify_publish_error(err: &PublishError) -> (Classification, String) {
    let class = match err {
        PublishError::Serialization(_)
        | PublishError::PayloadTooLarge(_)
        | PublishError::InvalidRecord(_) => Classification::PoisonPill,
        PublishError::Timeout(_)
        | PublishError::Interrupted(_)
        | PublishError::Transport(_)
        | PublishError::BrokerUnavailable(_)
        | PublishError::Other(_) => Classification::SystemFailure,
    };
    (class, err.to_string())
}
