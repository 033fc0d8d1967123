use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

use super::MailboxSender;
use crate::config::CommandSpec;
use crate::event::{ProducerEvent, ProducerId};
use crate::service::{Service, ServiceStatus, StatusSnapshot};

pub(crate) async fn run(
    id: ProducerId,
    services: Vec<Service>,
    check: CommandSpec,
    delay: Duration,
    tx: MailboxSender,
) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if tx.is_closed() {
        debug!(event = "poll_skipped", producer = %id);
        return;
    }

    let fallback = services.clone();
    let snapshot = match tokio::task::spawn_blocking(move || run_cycle(&services, &check)).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(event = "poll_join_error", producer = %id, error = %err);
            StatusSnapshot::new(
                fallback
                    .iter()
                    .map(|service| service.with_status(ServiceStatus::Error(err.to_string())))
                    .collect(),
            )
        }
    };
    let _ = tx.send(ProducerEvent::Snapshot(snapshot));
}

/// Checks every service in order. A failing service never prevents the
/// others from being checked.
pub fn run_cycle(services: &[Service], check: &CommandSpec) -> StatusSnapshot {
    let services = services
        .iter()
        .map(|service| {
            let status = check_service(service, check);
            debug!(event = "service_status", service = %service.name, status = %status);
            service.with_status(status)
        })
        .collect();
    StatusSnapshot::new(services)
}

/// Runs `<check> <unit>` and maps its combined output and exit code.
pub fn check_service(service: &Service, check: &CommandSpec) -> ServiceStatus {
    let output = check
        .std_command(&[service.unit.as_str()])
        .stdin(Stdio::null())
        .output();
    let output = match output {
        Ok(output) => output,
        Err(err) => {
            warn!(event = "check_spawn_error", service = %service.name, command = %check, error = %err);
            return ServiceStatus::Error(format!("{}: {err}", check.program));
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let text = text.trim().to_string();

    if output.status.success() {
        ServiceStatus::Ok(text)
    } else if text.is_empty() {
        ServiceStatus::Error(output.status.to_string())
    } else {
        ServiceStatus::Error(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn script_check(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script, "check"])
    }

    fn services(names: &[&str]) -> Vec<Service> {
        names.iter().map(|name| Service::new(*name, *name)).collect()
    }

    #[test]
    fn failing_service_does_not_abort_cycle() {
        let check = script_check(
            r#"case "$1" in svc-a) echo active ;; svc-b) exit 3 ;; esac"#,
        );
        let snapshot = run_cycle(&services(&["svc-a", "svc-b"]), &check);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.services[0].name, "svc-a");
        assert_eq!(
            snapshot.services[0].status,
            ServiceStatus::Ok("active".to_string())
        );
        assert_eq!(snapshot.services[1].name, "svc-b");
        assert!(snapshot.services[1].status.is_error());
    }

    #[test]
    fn exit_one_marks_only_that_service() {
        let check = script_check(r#"if [ "$1" = "b" ]; then echo down >&2; exit 1; fi; echo up"#);
        let snapshot = run_cycle(&services(&["a", "b", "c"]), &check);

        let statuses: Vec<&ServiceStatus> = snapshot.services.iter().map(|s| &s.status).collect();
        assert_eq!(
            statuses,
            vec![
                &ServiceStatus::Ok("up".to_string()),
                &ServiceStatus::Error("down".to_string()),
                &ServiceStatus::Ok("up".to_string()),
            ]
        );
    }

    #[test]
    fn missing_program_degrades_every_service_to_error() {
        let check = CommandSpec::new("tmon-definitely-missing-check", Vec::<String>::new());
        let snapshot = run_cycle(&services(&["one", "two"]), &check);

        let names: Vec<&str> = snapshot.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert!(snapshot.services.iter().all(|s| s.status.is_error()));
    }

    #[test]
    fn combined_output_includes_stderr() {
        let check = script_check("echo out; echo err >&2");
        let status = check_service(&Service::new("x", "x"), &check);
        assert_eq!(status, ServiceStatus::Ok("out\nerr".to_string()));
    }

    #[tokio::test]
    async fn poll_producer_publishes_one_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        run(
            ProducerId::new("status", 0),
            services(&["svc"]),
            script_check("echo active"),
            Duration::ZERO,
            tx,
        )
        .await;

        let event = rx.recv().await.expect("snapshot");
        match event {
            ProducerEvent::Snapshot(snapshot) => {
                assert_eq!(snapshot.len(), 1);
                assert_eq!(
                    snapshot.services[0].status,
                    ServiceStatus::Ok("active".to_string())
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
