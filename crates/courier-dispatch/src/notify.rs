use tracing::warn;

use courier_bridge::BatchReport;
use courier_store::{Identity, Task};

use crate::Services;

/// One-line execution summary shown in the owner's notification channel.
///
/// Identifies the task by name when it has one, otherwise by a truncated
/// message prefix.
pub fn format_summary(task: &Task, report: &BatchReport, ordinal: u64) -> String {
    let marker = if report.sent > 0 { "OK" } else { "FAILED" };
    let label = match &task.name {
        Some(name) if !name.is_empty() => format!("'{name}'"),
        _ => {
            let prefix: String = task.message.chars().take(40).collect();
            if task.message.chars().count() > 40 {
                format!("\"{prefix}…\"")
            } else {
                format!("\"{prefix}\"")
            }
        }
    };
    let total = report.sent + report.failed;
    format!(
        "[{marker}] Task {label} run #{ordinal}: sent to {}/{} destinations",
        report.sent, total
    )
}

/// Fire the summary at the owner's notification channel, detached.
///
/// Best-effort only: a failed or missing notifier is logged and nothing
/// else — task state and retry logic never depend on this path.
pub fn dispatch(svc: &Services, identity: &Identity, task: &Task, report: &BatchReport, ordinal: u64) {
    if !identity.notifications_enabled {
        return;
    }
    let Some(notifier) = svc.notifier.clone() else {
        return;
    };

    let text = format_summary(task, report, ordinal);
    let remote_id = identity.remote_id;
    let task_id = task.id.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send(remote_id, &text).await {
            warn!(task_id = %task_id, error = %e, "execution notification failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::trigger::Trigger;
    use courier_core::types::now_rfc3339;
    use courier_store::TaskStatus;

    fn task(name: Option<&str>, message: &str) -> Task {
        let now = now_rfc3339();
        Task {
            id: "t".into(),
            identity_id: 1,
            name: name.map(String::from),
            message: message.into(),
            attachments: vec![],
            targets: vec![1, 2, 3],
            trigger: Trigger::Interval { every_secs: 60 },
            status: TaskStatus::Active,
            running: false,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            send_delay_secs: 2,
            last_run: None,
            next_run: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn named_task_summary() {
        let report = BatchReport {
            sent: 2,
            failed: 1,
            auth_revoked: false,
        };
        let line = format_summary(&task(Some("digest"), "x"), &report, 7);
        assert_eq!(line, "[OK] Task 'digest' run #7: sent to 2/3 destinations");
    }

    #[test]
    fn unnamed_task_uses_truncated_message() {
        let report = BatchReport {
            sent: 0,
            failed: 3,
            auth_revoked: true,
        };
        let long = "a".repeat(60);
        let line = format_summary(&task(None, &long), &report, 1);
        assert!(line.starts_with("[FAILED] Task \"aaaa"));
        assert!(line.contains('…'));
        assert!(line.ends_with("sent to 0/3 destinations"));
    }
}
