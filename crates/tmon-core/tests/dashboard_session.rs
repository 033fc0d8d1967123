use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{backend::TestBackend, buffer::Buffer, layout::Rect, Terminal};
use tmon_core::{CommandSpec, Dashboard, DashboardConfig, Event, Flow, ServiceEntry};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

const WIDTH: u16 = 100;
const HEIGHT: u16 = 20;

fn screen(buffer: &Buffer) -> String {
    let mut text = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            text.push_str(buffer.get(x, y).symbol());
        }
        text.push('\n');
    }
    text
}

fn config(check: CommandSpec, log_stream: CommandSpec) -> DashboardConfig {
    DashboardConfig {
        services: vec![
            ServiceEntry::new("svc-a", "a.service"),
            ServiceEntry::new("svc-b", "b.service"),
        ],
        status_check: check,
        log_stream,
        poll_delay_ms: 20,
        ..DashboardConfig::default()
    }
}

/// Runs the loop by hand until every needle is on screen, then quits.
async fn drive_until(config: DashboardConfig, needles: &[&str]) -> String {
    let mut dashboard = Dashboard::new(&config);
    let mut terminal = Terminal::new(TestBackend::new(WIDTH, HEIGHT)).expect("terminal");
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(Event::Resize {
        width: WIDTH,
        height: HEIGHT,
    })
    .expect("send resize");

    assert_eq!(dashboard.start(), Flow::Continue);
    let deadline = Instant::now() + Duration::from_secs(10);
    let last = loop {
        terminal
            .draw(|frame| dashboard.draw(frame))
            .expect("draw");
        let text = screen(terminal.backend().buffer());
        if needles.iter().all(|needle| text.contains(needle)) {
            break text;
        }

        let event = timeout_at(deadline, dashboard.next_event(&mut rx))
            .await
            .unwrap_or_else(|_| panic!("dashboard stalled; screen was:\n{text}"))
            .expect("ui channel open");
        if let Event::Resize { width, height } = event {
            terminal
                .resize(Rect::new(0, 0, width, height))
                .expect("resize");
        }
        assert_eq!(dashboard.apply(&event), Flow::Continue);
    };

    tx.send(Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)))
        .expect("send quit");
    let quit = timeout_at(deadline, dashboard.next_event(&mut rx))
        .await
        .expect("quit delivered")
        .expect("ui channel open");
    assert_eq!(dashboard.apply(&quit), Flow::Quit);
    last
}

#[tokio::test]
async fn status_and_log_panels_fill_from_their_producers() {
    let check = CommandSpec::new(
        "sh",
        [
            "-c",
            r#"case "$1" in a.service) echo active ;; *) exit 3 ;; esac"#,
            "check",
        ],
    );
    let stream = CommandSpec::new("sh", ["-c", "printf 'line1\\n'; printf 'line2\\n'"]);

    let text = drive_until(
        config(check, stream),
        &["active", "exit status: 3", "line1", "line2", "stream ended"],
    )
    .await;

    let line1 = text.find("line1").expect("line1 on screen");
    let line2 = text.find("line2").expect("line2 on screen");
    assert!(line1 < line2);
    assert!(text.contains("svc-a"));
    assert!(text.contains("svc-b"));
}

#[tokio::test]
async fn missing_programs_degrade_instead_of_failing() {
    let check = CommandSpec::new("tmon-missing-check", Vec::<String>::new());
    let stream = CommandSpec::new("tmon-missing-stream", Vec::<String>::new());

    let text = drive_until(
        config(check, stream),
        &["tmon-missing-check", "could not start"],
    )
    .await;
    assert!(text.contains("svc-a"));
}
