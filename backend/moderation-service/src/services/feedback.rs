use crate::models::FeedbackType;

/// Map user feedback to a reward in `[-1, 1]`.
///
/// A 1-5 rating maps linearly to `(rating - 3) / 2`; without one, thumbs up
/// is `0.5` and thumbs down `-0.5`. Thumbs up never drops below `0.1` and
/// thumbs down never rises above `-0.1`. Out-of-range ratings are ignored.
pub fn normalize_feedback(feedback: FeedbackType, rating: Option<u8>) -> f64 {
    let rating = rating.filter(|r| (1..=5).contains(r));
    let from_rating = |r: u8| (f64::from(r) - 3.0) / 2.0;

    match feedback {
        FeedbackType::ThumbsUp => rating.map(from_rating).unwrap_or(0.5).max(0.1),
        FeedbackType::ThumbsDown => rating.map(from_rating).unwrap_or(-0.5).min(-0.1),
    }
}
