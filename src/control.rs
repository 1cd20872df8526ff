//! Supervising controller: the play loop and the operator-facing seam.
//!
//! A dedicated thread owns playback; it is the only writer of queue state
//! while a program runs. External requests (load, single-step, pause) come
//! in on other threads and go through one session mutex plus the `running`
//! flag, so at most one stepping/motion operation is ever in flight. Pause
//! and the status snapshot bypass the mutex entirely via [`MachineState`],
//! which is what keeps them responsive mid-move.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use thiserror::Error;

use crate::gcode::{Interpreter, StepError, StepOutcome, parse};
use crate::machine::{Machine, MachineState};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("a playback is already in progress")]
    Busy,
    #[error("no program loaded")]
    NoProgram,
    #[error(transparent)]
    Step(#[from] StepError),
}

/// What the transport layer polls at a fixed cadence.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub program_loaded: bool,
    pub position: (f64, f64),
    pub calibrated: bool,
}

enum PlaySignal {
    Play,
    Shutdown,
}

struct Session {
    machine: Box<dyn Machine>,
    interpreter: Option<Interpreter>,
}

pub struct Controller {
    session: Arc<Mutex<Session>>,
    state: Arc<MachineState>,
    running: Arc<AtomicBool>,
    program_loaded: Arc<AtomicBool>,
    last_program: Mutex<Option<String>>,
    play_tx: Sender<PlaySignal>,
    play_thread: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(machine: Box<dyn Machine>, state: Arc<MachineState>) -> Self {
        let session = Arc::new(Mutex::new(Session {
            machine,
            interpreter: None,
        }));
        let running = Arc::new(AtomicBool::new(false));
        let program_loaded = Arc::new(AtomicBool::new(false));
        let (play_tx, play_rx) = crossbeam_channel::unbounded();

        let play_thread = spawn_play_loop(
            Arc::clone(&session),
            Arc::clone(&state),
            Arc::clone(&running),
            Arc::clone(&program_loaded),
            play_rx,
        );

        Self {
            session,
            state,
            running,
            program_loaded,
            last_program: Mutex::new(None),
            play_tx,
            play_thread: Some(play_thread),
        }
    }

    /// Parse `src` and install it as the current program, replacing any
    /// previous one. Returns the number of commands queued; dropped
    /// commands have already been logged.
    pub fn load_program(&self, src: &str) -> Result<usize, ControlError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ControlError::Busy);
        }
        let program = parse(src);
        let queued = program.commands.len();
        let mut session = lock(&self.session);
        session.interpreter = Some(Interpreter::new(program));
        self.program_loaded.store(queued > 0, Ordering::SeqCst);
        self.state.clear_pause();
        *lock(&self.last_program) = Some(src.to_string());
        tracing::info!(queued, "program loaded");
        Ok(queued)
    }

    /// Re-install the most recently loaded program from the start.
    pub fn reload_last(&self) -> Result<usize, ControlError> {
        let last = lock(&self.last_program).clone();
        match last {
            Some(src) => self.load_program(&src),
            None => Err(ControlError::NoProgram),
        }
    }

    /// Signal the play thread to run the loaded program to completion (or
    /// until a pause request lands).
    pub fn play(&self) {
        let _ = self.play_tx.send(PlaySignal::Play);
    }

    /// Request a pause. The in-flight move (if any) stops within one pulse
    /// tick, leaving its command queued for resume.
    pub fn pause(&self) {
        self.state.request_pause();
        tracing::info!("pause requested");
    }

    pub fn play_pause(&self) {
        if self.is_running() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Execute exactly one command-step outside of playback.
    pub fn step_once(&self) -> Result<StepOutcome, ControlError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ControlError::Busy);
        }
        let mut session = lock(&self.session);
        let Session {
            machine,
            interpreter,
        } = &mut *session;
        let Some(current) = interpreter.as_mut() else {
            return Err(ControlError::NoProgram);
        };
        let result = current.step(machine.as_mut());
        let finished = current.is_finished();
        if finished {
            *interpreter = None;
            self.program_loaded.store(false, Ordering::SeqCst);
        }
        Ok(result?)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running.load(Ordering::SeqCst),
            program_loaded: self.program_loaded.load(Ordering::SeqCst),
            position: self.state.position(),
            calibrated: self.state.is_calibrated(),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // Stop any in-flight move so the play thread can observe Shutdown.
        self.state.request_pause();
        let _ = self.play_tx.send(PlaySignal::Shutdown);
        if let Some(handle) = self.play_thread.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_play_loop(
    session: Arc<Mutex<Session>>,
    state: Arc<MachineState>,
    running: Arc<AtomicBool>,
    program_loaded: Arc<AtomicBool>,
    play_rx: Receiver<PlaySignal>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("play-loop".into())
        .spawn(move || {
            for signal in play_rx {
                match signal {
                    PlaySignal::Shutdown => break,
                    PlaySignal::Play => {}
                }
                running.store(true, Ordering::SeqCst);
                state.clear_pause();
                run_program(&session, &state, &program_loaded);
                running.store(false, Ordering::SeqCst);
            }
            tracing::debug!("play loop shut down");
        })
        .expect("spawn play-loop thread")
}

fn run_program(
    session: &Arc<Mutex<Session>>,
    state: &Arc<MachineState>,
    program_loaded: &Arc<AtomicBool>,
) {
    let mut session = lock(session);
    let Session {
        machine,
        interpreter,
    } = &mut *session;

    loop {
        let Some(current) = interpreter.as_mut() else {
            break;
        };
        match current.step(machine.as_mut()) {
            Ok(StepOutcome::Idle) => break,
            Ok(StepOutcome::Pending) => {
                tracing::info!("playback paused mid-move");
                break;
            }
            Ok(StepOutcome::Advanced) | Ok(StepOutcome::SafetyStopped) => {
                // Pause requests between commands land here.
                if state.pause_pending() {
                    tracing::info!("playback paused between commands");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "command failed, playback halted");
                break;
            }
        }
    }

    if interpreter.as_ref().is_some_and(Interpreter::is_finished) {
        *interpreter = None;
        program_loaded.store(false, Ordering::SeqCst);
        tracing::info!("program complete");
    }
}

/// Lock, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
