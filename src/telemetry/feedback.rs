use super::types::{Feedback, FeedbackSignal, FinalDecision, LayerAttempt, LayerFeedback, Outcome};

/// Compare each layer's recorded confidence and threshold against what the
/// outcome revealed, classifying every attempt into a tuning signal.
pub fn derive_feedback(
    attempts: &[LayerAttempt],
    decision: &FinalDecision,
    outcome: &Outcome,
) -> Feedback {
    let true_target = outcome.true_target(decision.selected_target.as_deref());

    let signals = attempts
        .iter()
        .filter(|attempt| attempt.attempted)
        .map(|attempt| {
            let signal = match &true_target {
                Some(target) => {
                    let had_right_answer = attempt.selected_target.as_deref() == Some(target.as_str());
                    match (attempt.success, had_right_answer) {
                        (true, true) => FeedbackSignal::Confirmed,
                        (true, false) => FeedbackSignal::ThresholdTooLow,
                        (false, true) => FeedbackSignal::ThresholdTooHigh,
                        (false, false) => FeedbackSignal::CorrectDeferral,
                    }
                }
                // Without ground truth the only thing we still know is that
                // an accepting layer was wrong when the routing as a whole
                // was reported wrong.
                None if attempt.success && outcome.was_correct_target == Some(false) => {
                    FeedbackSignal::ThresholdTooLow
                }
                None => FeedbackSignal::Unknown,
            };

            LayerFeedback {
                layer_id: attempt.layer_id,
                layer_name: attempt.layer_name.clone(),
                confidence: attempt.confidence,
                threshold: attempt.threshold,
                signal,
            }
        })
        .collect();

    Feedback {
        true_target,
        signals,
    }
}
