mod cli;
mod decode;
mod ui;

use std::process::ExitCode;

use clap::Parser;
use winit::event_loop::EventLoop;

use crate::cli::Cli;
use crate::ui::state::ViewerState;
use crate::ui::App;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let state = ViewerState::new(cli.files);
    let mut app = App::new(state);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            eprintln!("miv: cannot connect to display: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = event_loop.run_app(&mut app) {
        eprintln!("miv: event loop: {e}");
        return ExitCode::FAILURE;
    }

    // Decode failures surface here rather than exiting from the handlers.
    if let Some(err) = app.take_fatal() {
        eprintln!("miv: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
