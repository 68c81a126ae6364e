//! Assertions on stage outputs and wire events.

use crate::core::{StageOutcome, StageOutput, STATUS_KEY};

/// Asserts that the output has the expected outcome.
pub fn assert_outcome(output: &StageOutput, expected: StageOutcome) {
    assert_eq!(
        output.outcome, expected,
        "Expected {expected}, got {} (message: {:?}, code: {:?})",
        output.outcome, output.message, output.error_code
    );
}

/// Asserts that the output succeeded.
pub fn assert_succeeded(output: &StageOutput) {
    assert_outcome(output, StageOutcome::Success);
}

/// Asserts that the output asks for a retry.
pub fn assert_retryable(output: &StageOutput) {
    assert_outcome(output, StageOutcome::Retryable);
}

/// Asserts that the output ends the execution as superseded.
pub fn assert_bombed_out(output: &StageOutput) {
    assert_outcome(output, StageOutcome::Terminal);
}

/// Asserts that the output skipped its input.
pub fn assert_skipped(output: &StageOutput) {
    assert_outcome(output, StageOutcome::Skipped);
}

/// Asserts that the output carries the given error code.
pub fn assert_error_code(output: &StageOutput, code: &str) {
    assert_eq!(
        output.error_code.as_deref(),
        Some(code),
        "Expected error code {code}, got {:?} (message: {:?})",
        output.error_code,
        output.message
    );
}

/// Asserts the status string of a wire event.
pub fn assert_wire_status(event: &serde_json::Value, expected: StageOutcome) {
    assert_eq!(
        event.get(STATUS_KEY).and_then(serde_json::Value::as_str),
        Some(expected.as_str()),
        "Unexpected wire status in {event}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_succeeded() {
        assert_succeeded(&StageOutput::success_empty());
    }

    #[test]
    #[should_panic(expected = "Expected SUCCEEDED, got FAILED")]
    fn test_assert_succeeded_fails() {
        assert_succeeded(&StageOutput::retryable("not yet"));
    }

    #[test]
    fn test_assert_bombed_out() {
        assert_bombed_out(&StageOutput::terminal("superseded"));
    }

    #[test]
    fn test_assert_skipped() {
        assert_skipped(&StageOutput::skipped("no grid"));
    }

    #[test]
    fn test_assert_wire_status() {
        let event = StageOutput::retryable("later")
            .into_pipeline_event(serde_json::json!({}))
            .to_value("satflow");
        assert_wire_status(&event, StageOutcome::Retryable);
    }
}
