//! Activity score: a 0-100 snapshot of how active and complete an account is.
//!
//! | component    | max | rule                                             |
//! |--------------|-----|--------------------------------------------------|
//! | followers    | 30  | linear up to 10 000 followers                    |
//! | verified     | 10  | all or nothing                                   |
//! | activity     | 20  | linear up to 10 recent posts                     |
//! | engagement   | 30  | linear up to 100 average reposts + favorites     |
//! | completeness | 10  | 2.5 each for bio, location, website, banner      |

use cpdb_core::{FetchedPost, ProfileSnapshot, MAX_ACTIVITY_SCORE};

const FOLLOWER_SATURATION: f64 = 10_000.0;
const FOLLOWER_WEIGHT: f64 = 30.0;
const VERIFIED_BONUS: f64 = 10.0;
const POSTS_SATURATION: f64 = 10.0;
const ACTIVITY_WEIGHT: f64 = 20.0;
const ENGAGEMENT_SATURATION: f64 = 100.0;
const ENGAGEMENT_WEIGHT: f64 = 30.0;
const COMPLETENESS_FIELD_WEIGHT: f64 = 2.5;

/// Computes the activity score for a freshly fetched profile and its posts.
///
/// Deterministic: the same inputs always produce the same score. Negative
/// counts are treated as zero. The result is rounded half away from zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn activity_score(profile: &ProfileSnapshot, recent_posts: &[FetchedPost]) -> u8 {
    let followers = profile.followers_count.max(0) as f64;
    let follower_points = (followers / FOLLOWER_SATURATION).min(1.0) * FOLLOWER_WEIGHT;

    let verified_points = if profile.verified { VERIFIED_BONUS } else { 0.0 };

    let post_count = recent_posts.len() as f64;
    let activity_points = (post_count / POSTS_SATURATION).min(1.0) * ACTIVITY_WEIGHT;

    let engagement_points = if recent_posts.is_empty() {
        0.0
    } else {
        let total: f64 = recent_posts.iter().map(|p| p.engagement() as f64).sum();
        let average = total / post_count;
        (average / ENGAGEMENT_SATURATION).min(1.0) * ENGAGEMENT_WEIGHT
    };

    let filled_fields = [
        profile.bio.is_some(),
        profile.location.is_some(),
        profile.website.is_some(),
        profile.banner_url.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();
    let completeness_points = filled_fields as f64 * COMPLETENESS_FIELD_WEIGHT;

    let total = follower_points
        + verified_points
        + activity_points
        + engagement_points
        + completeness_points;

    total.clamp(0.0, f64::from(MAX_ACTIVITY_SCORE)).round() as u8
}
