use std::fmt;

/// Terminal outcome of a launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartResult {
    Success,
    TaskToFront,
    DeliveredToTop,
    Canceled,
    Aborted,
    IntentNotResolved,
    ClassNotFound,
    ForwardAndRequestConflict,
    NotVoiceCompatible,
    PermissionDenied,
    LockTaskModeViolation,
}

/// Result reported to a caller for every internal result, in declaration order.
///
/// Aborted starts are reported as successful so the caller cannot tell it was blocked.
const EXTERNAL_RESULTS: [(StartResult, StartResult); 11] = {
    use StartResult::*;
    [
        (Success, Success),
        (TaskToFront, Success),
        (DeliveredToTop, Success),
        (Canceled, Canceled),
        (Aborted, Success),
        (IntentNotResolved, IntentNotResolved),
        (ClassNotFound, ClassNotFound),
        (ForwardAndRequestConflict, ForwardAndRequestConflict),
        (NotVoiceCompatible, NotVoiceCompatible),
        (PermissionDenied, PermissionDenied),
        (LockTaskModeViolation, LockTaskModeViolation),
    ]
};

impl StartResult {
    pub const ALL: [StartResult; 11] = {
        let mut all = [StartResult::Success; 11];
        let mut i = 0;
        while i < EXTERNAL_RESULTS.len() {
            all[i] = EXTERNAL_RESULTS[i].0;
            i += 1;
        }
        all
    };

    /// Platform numeric code.
    pub fn code(self) -> i32 {
        match self {
            StartResult::Success => 0,
            StartResult::TaskToFront => 2,
            StartResult::DeliveredToTop => 3,
            StartResult::LockTaskModeViolation => 101,
            StartResult::Aborted => 102,
            StartResult::IntentNotResolved => -91,
            StartResult::ClassNotFound => -92,
            StartResult::ForwardAndRequestConflict => -93,
            StartResult::PermissionDenied => -94,
            StartResult::Canceled => -96,
            StartResult::NotVoiceCompatible => -97,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|result| result.code() == code)
    }

    /// Codes 0 to 99 mean something was started or brought forward.
    pub fn is_successful(self) -> bool {
        (0..100).contains(&self.code())
    }

    pub fn name(self) -> &'static str {
        match self {
            StartResult::Success => "success",
            StartResult::TaskToFront => "task-to-front",
            StartResult::DeliveredToTop => "delivered-to-top",
            StartResult::Canceled => "canceled",
            StartResult::Aborted => "aborted",
            StartResult::IntentNotResolved => "intent-not-resolved",
            StartResult::ClassNotFound => "class-not-found",
            StartResult::ForwardAndRequestConflict => "forward-and-request-conflict",
            StartResult::NotVoiceCompatible => "not-voice-compatible",
            StartResult::PermissionDenied => "permission-denied",
            StartResult::LockTaskModeViolation => "lock-task-mode-violation",
        }
    }
}

impl fmt::Display for StartResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Translates an internal result to what callers that only need a yes or no get to see.
pub fn get_external_result(result: StartResult) -> StartResult {
    EXTERNAL_RESULTS[result as usize].1
}

/// Misuse of the starter API, reported instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("file descriptors passed in intent")]
    FileDescriptorsInIntent,
    #[error("launch request was already executed")]
    AlreadyExecuted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_in_declaration_order() {
        for (idx, (internal, _)) in EXTERNAL_RESULTS.iter().enumerate() {
            assert_eq!(*internal as usize, idx);
        }
    }

    #[test]
    fn external_result_hides_internal_successes() {
        for result in StartResult::ALL {
            let external = get_external_result(result);
            match result {
                StartResult::Success
                | StartResult::TaskToFront
                | StartResult::DeliveredToTop
                | StartResult::Aborted => assert_eq!(external, StartResult::Success),
                other => assert_eq!(external, other),
            }
        }
    }

    #[test]
    fn codes_round_trip_and_classify() {
        for result in StartResult::ALL {
            assert_eq!(StartResult::from_code(result.code()), Some(result));
        }
        assert_eq!(StartResult::from_code(1), None);

        let successful: Vec<_> = StartResult::ALL
            .into_iter()
            .filter(|r| r.is_successful())
            .collect();
        assert_eq!(
            successful,
            [
                StartResult::Success,
                StartResult::TaskToFront,
                StartResult::DeliveredToTop
            ]
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            StartResult::LockTaskModeViolation.to_string(),
            "lock-task-mode-violation (101)"
        );
    }
}
