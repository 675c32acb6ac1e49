//! Terminal rendering of run events.

use tether_core::RunEvent;

/// Where a rendered line goes.
#[derive(Debug, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    Stderr,
}

/// Render one event. Assistant text goes to stdout; everything else is
/// status and goes to stderr.
pub fn render(event: &RunEvent) -> Option<(Sink, String)> {
    let line = match event {
        RunEvent::ProviderReady { provider, tools } => {
            (Sink::Stderr, format!("  [provider {provider}: {tools} tool(s)]"))
        }
        RunEvent::ProviderFailed { provider, reason } => (
            Sink::Stderr,
            format!("  [provider {provider} unavailable: {reason}]"),
        ),
        RunEvent::Text(text) => (Sink::Stdout, text.clone()),
        RunEvent::ToolStart {
            name, arguments, ..
        } => (Sink::Stderr, format!("  [tool: {name} {arguments}]")),
        RunEvent::ToolEnd {
            name,
            output,
            is_error,
        } => {
            let status = if *is_error { "error" } else { "done" };
            (Sink::Stderr, format!("  [tool {name} {status}: {output}]"))
        }
        RunEvent::HostAction {
            name, arguments, ..
        } => (Sink::Stderr, format!("  [host action: {name} {arguments}]")),
        RunEvent::IterationLimit { iterations } => (
            Sink::Stderr,
            format!("  [stopped after {iterations} tool iteration(s)]"),
        ),
        RunEvent::Cancelled => (Sink::Stderr, "  [cancelled]".to_string()),
        RunEvent::Error(e) => (Sink::Stderr, format!("Error: {e}")),
        RunEvent::Done => return None,
    };
    Some(line)
}
