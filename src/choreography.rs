//! Button handling and round generation.
//!
//! Everything here is pure: a button press maps to a [`ButtonAction`], and a
//! round is precomputed up front as a list of [`Event`]s expressed as
//! offsets from one latched start instant. Nothing here sleeps or touches
//! sockets; the scheduler turns events into deliveries as time passes.
//!
//! A round over targets `T0..Tn` with pass delays `d0, d1, ...`:
//!
//! ```text
//! pass 0:  T0 [0, d0)  T1 [d0, 2*d0)  ...  Tn-1 [(n-1)*d0, n*d0)
//! pass 1:  T0 [n*d0, n*d0+d1)  ...
//! ...
//! finale A (flash x4, pause, sustain)  then  finale B (sustain)
//! ```

use std::fmt;
use std::time::Duration;

use crate::config::Config;
use crate::constants::{
    FINALE_A_FLASHES, FINALE_A_FLASH_OFF_MS, FINALE_A_FLASH_ON_MS, FINALE_A_PAUSE_MS,
    FINALE_A_SUSTAIN_MS, FINALE_A_WINDOW_MS, FINALE_B_SUSTAIN_MS, KEEP_ALIVE,
};
use crate::protocol::{EffectCommand, Message, ProtocolError};
use crate::registry::EffectRef;

/// What a scheduled event is part of. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// One target's slot in a round pass.
    Pass(usize),
    /// One of finale A's short flashes.
    Flash,
    /// A finale's sustained activation.
    Sustain,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Pass(n) => write!(f, "pass {n}"),
            ActionKind::Flash => f.write_str("flash"),
            ActionKind::Sustain => f.write_str("sustain"),
        }
    }
}

/// One timed activation: activate at `start`, deactivate at `start + duration`.
///
/// Offsets are relative to the owning sequence's start instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What the targets do for the event's duration.
    pub kind: ActionKind,
    /// Offset of the begin action.
    pub start: Duration,
    /// Time between begin and end.
    pub duration: Duration,
    /// Set once the begin action has fired.
    pub started: bool,
    /// Targets captured when the round was generated.
    pub targets: Vec<EffectRef>,
}

impl Event {
    /// Create an unstarted event for a single target.
    pub fn new(kind: ActionKind, start: Duration, duration: Duration, target: EffectRef) -> Self {
        Self {
            kind,
            start,
            duration,
            started: false,
            targets: vec![target],
        }
    }

    /// Offset at which the end action fires.
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// A decoded `B:<button>:<state>` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    /// Button number, 1 to 3 on the stock panel.
    pub button: u32,
    /// True on press, false on release.
    pub pressed: bool,
}

impl ButtonPress {
    /// Parse a button record.
    ///
    /// Returns `Ok(None)` for a bare announcement (`B`) and for the button
    /// client's keep-alive (`B:KA:0`).
    pub fn parse(message: &Message) -> Result<Option<Self>, ProtocolError> {
        let Some(number) = message.field(0) else {
            return Ok(None);
        };
        if number == KEEP_ALIVE {
            return Ok(None);
        }

        let button = number
            .parse::<u32>()
            .map_err(|e| ProtocolError::InvalidButton(format!("button {number:?}: {e}")))?;
        let pressed = match message.field(1) {
            Some("1") => true,
            Some("0") => false,
            other => return Err(ProtocolError::InvalidButton(format!("state {other:?}"))),
        };

        Ok(Some(Self { button, pressed }))
    }
}

/// What the hub should do about a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Send a command to every bound effect right now.
    Broadcast(EffectCommand),
    /// Schedule a generated round.
    Round(Vec<Event>),
    /// Nothing to do.
    Ignore,
}

/// Round and finale generator.
#[derive(Debug, Clone)]
pub struct Choreographer {
    pass_delays: Vec<Duration>,
    finale_a: Option<String>,
    finale_b: Option<String>,
}

impl Choreographer {
    /// Create a generator with one pass per entry in `pass_delays`.
    ///
    /// Finale effects are named; `None` leaves that finale out of rounds.
    pub fn new(
        pass_delays: Vec<Duration>,
        finale_a: Option<String>,
        finale_b: Option<String>,
    ) -> Self {
        Self {
            pass_delays,
            finale_a,
            finale_b,
        }
    }

    /// Create a generator from the configured pass delays and finales.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pass_delays(),
            config.finale_a.clone(),
            config.finale_b.clone(),
        )
    }

    /// Map a button press to an action.
    ///
    /// `ordered` and `all` are the registry's current views; `origin` is the
    /// name of the sender, which never takes part in a round.
    pub fn on_button(
        &self,
        press: ButtonPress,
        ordered: &[EffectRef],
        all: &[EffectRef],
        origin: &str,
    ) -> ButtonAction {
        match (press.button, press.pressed) {
            (1, true) => ButtonAction::Broadcast(EffectCommand::Activate),
            (1, false) => ButtonAction::Broadcast(EffectCommand::Deactivate),
            (2, true) => ButtonAction::Round(self.generate_round(ordered, all, origin)),
            (3, true) => ButtonAction::Broadcast(EffectCommand::Storm),
            _ => ButtonAction::Ignore,
        }
    }

    /// Precompute a full round, passes then finales.
    ///
    /// Finale effects are looked up in `all`, so they fire even when absent
    /// from the round order. Offsets are non-decreasing.
    pub fn generate_round(&self, ordered: &[EffectRef], all: &[EffectRef], origin: &str) -> Vec<Event> {
        let targets: Vec<&EffectRef> = ordered.iter().filter(|e| e.name != origin).collect();
        let mut events = Vec::new();
        let mut cursor = Duration::ZERO;

        if !targets.is_empty() {
            for (pass, delay) in self.pass_delays.iter().enumerate() {
                for target in &targets {
                    events.push(Event::new(ActionKind::Pass(pass), cursor, *delay, (*target).clone()));
                    cursor += *delay;
                }
            }
        }

        let find = |name: &Option<String>| {
            let name = name.as_deref()?;
            if name == origin {
                return None;
            }
            all.iter().find(|e| e.name == name).cloned()
        };

        if let Some(target) = find(&self.finale_a) {
            push_finale_a(&mut events, cursor, target);
            cursor += Duration::from_millis(FINALE_A_WINDOW_MS);
        }
        if let Some(target) = find(&self.finale_b) {
            events.push(Event::new(
                ActionKind::Sustain,
                cursor,
                Duration::from_millis(FINALE_B_SUSTAIN_MS),
                target,
            ));
        }

        log::debug!(
            "[Round] Generated {} events over {} targets ({}ms)",
            events.len(),
            targets.len(),
            round_span(&events).as_millis()
        );
        events
    }
}

/// Four flashes, a pause, then the sustained burst.
fn push_finale_a(events: &mut Vec<Event>, start: Duration, target: EffectRef) {
    let on = Duration::from_millis(FINALE_A_FLASH_ON_MS);
    let period = on + Duration::from_millis(FINALE_A_FLASH_OFF_MS);
    let mut cursor = start;

    for _ in 0..FINALE_A_FLASHES {
        events.push(Event::new(ActionKind::Flash, cursor, on, target.clone()));
        cursor += period;
    }
    cursor += Duration::from_millis(FINALE_A_PAUSE_MS);
    events.push(Event::new(
        ActionKind::Sustain,
        cursor,
        Duration::from_millis(FINALE_A_SUSTAIN_MS),
        target,
    ));
}

/// Offset of the last end action in a sequence.
pub fn round_span(events: &[Event]) -> Duration {
    events.iter().map(Event::end).max().unwrap_or_default()
}
