//! Scripted open-loop UI flows
//!
//! Flows tap several candidate coordinates per logical step because the
//! target button's position differs between app versions and screen sizes.
//! Nothing is read back from the device; a flow that issued every step
//! without a protocol error is reported as attempted.

use std::time::Duration;

use super::{ActionResult, Actuator, Connected, KeyCode};
use crate::Result;

const APP_LOAD_DELAY: Duration = Duration::from_secs(5);
const TAP_DELAY: Duration = Duration::from_secs(1);
const TEXT_DELAY: Duration = Duration::from_secs(2);

const PAYMENT_APP: &str = "google pay";
const CALENDAR_APP: &str = "calendar";

/// One step of a scripted flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// Tap, then wait one second
    Tap(u32, u32),
    /// Type text, then wait two seconds
    Text(String),
    /// Send a key event
    Key(KeyCode),
    /// Wait for a fixed base delay
    Wait(Duration),
}

fn taps(points: &[(u32, u32)]) -> impl Iterator<Item = FlowStep> + '_ {
    points.iter().map(|&(x, y)| FlowStep::Tap(x, y))
}

/// Steps that send `amount` to `recipient` once the payment app is open
#[must_use]
pub fn payment_steps(recipient: &str, amount: &str) -> Vec<FlowStep> {
    let mut steps = vec![FlowStep::Wait(APP_LOAD_DELAY)];
    // send money
    steps.extend(taps(&[(500, 1000), (500, 800), (300, 1200)]));
    steps.push(FlowStep::Wait(TEXT_DELAY));
    steps.push(FlowStep::Text(recipient.to_string()));
    // contact
    steps.extend(taps(&[(500, 300), (300, 400), (400, 350)]));
    steps.push(FlowStep::Text(clean_amount(amount)));
    // pay
    steps.extend(taps(&[(500, 1500), (500, 1300), (300, 1400)]));
    // confirm
    steps.extend(taps(&[(500, 1200), (500, 1000), (300, 1100)]));
    steps
}

/// Steps that create a calendar event once the calendar app is open
#[must_use]
pub fn calendar_steps(name: &str, date: &str) -> Vec<FlowStep> {
    let mut steps = vec![FlowStep::Wait(APP_LOAD_DELAY)];
    // create
    steps.extend(taps(&[(500, 1600), (500, 1500), (300, 1600), (900, 1600)]));
    // event
    steps.extend(taps(&[(500, 700), (500, 800), (500, 600)]));
    steps.push(FlowStep::Text(name.to_string()));
    // date field
    steps.extend(taps(&[(500, 900), (500, 1000), (500, 800)]));
    steps.push(FlowStep::Key(KeyCode::Delete));
    steps.push(FlowStep::Key(KeyCode::Delete));
    steps.push(FlowStep::Text(date.to_string()));
    // save
    steps.extend(taps(&[(900, 100), (800, 200), (700, 100)]));
    steps
}

/// First word of a spoken amount, reduced to digits and dots
#[must_use]
pub fn clean_amount(amount: &str) -> String {
    amount
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

impl Actuator {
    /// Attempt a payment through the payment app
    pub async fn send_payment(&self, recipient: &str, amount: &str) -> Option<ActionResult> {
        let device = self.connected().await?;
        tracing::info!(recipient, amount, "starting payment flow");

        let steps = payment_steps(recipient, amount);
        let result = match run_flow(device, PAYMENT_APP, &steps).await {
            Ok(()) => ActionResult::success(format!(
                "I've attempted to send {amount} to {recipient}. \
                 Please check if the transaction was successful."
            )),
            Err(e) => {
                tracing::error!(error = %e, "payment flow failed");
                ActionResult::failure("Failed to initiate the transaction. Please try again manually.")
            }
        };
        self.speak(&result.message);
        Some(result)
    }

    /// Attempt to create a calendar event
    pub async fn schedule_event(&self, name: &str, date: &str) -> Option<ActionResult> {
        let device = self.connected().await?;
        tracing::info!(event = name, date, "starting calendar flow");

        let steps = calendar_steps(name, date);
        let result = match run_flow(device, CALENDAR_APP, &steps).await {
            Ok(()) => ActionResult::success(format!(
                "I've attempted to schedule '{name}' on {date}. Please check your calendar."
            )),
            Err(e) => {
                tracing::error!(error = %e, "calendar flow failed");
                ActionResult::failure("Failed to schedule the event. Please try again manually.")
            }
        };
        self.speak(&result.message);
        Some(result)
    }
}

/// Open `app` then execute `steps`; the launch outcome does not stop the flow
async fn run_flow(device: Connected<'_>, app: &str, steps: &[FlowStep]) -> Result<()> {
    let actuator = device.actuator();
    match actuator.registry().lookup(app) {
        Some(package) => {
            let package = package.to_string();
            let open = device.open_package(&package, app).await;
            if !open.success {
                tracing::warn!(app, message = %open.message, "continuing flow after failed launch");
            }
        }
        None => tracing::warn!(app, "flow app missing from registry"),
    }

    let pace = actuator.pace();
    for step in steps {
        match step {
            FlowStep::Tap(x, y) => {
                actuator.device().tap(*x, *y).await?;
                pace.pause(TAP_DELAY).await;
            }
            FlowStep::Text(text) => {
                actuator.enter_text(text).await?;
                pace.pause(TEXT_DELAY).await;
            }
            FlowStep::Key(key) => actuator.device().key_event(*key).await?,
            FlowStep::Wait(delay) => pace.pause(*delay).await,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_is_cleaned_from_first_word() {
        assert_eq!(clean_amount("500 rupees"), "500");
        assert_eq!(clean_amount("$12.50"), "12.50");
        assert_eq!(clean_amount("fifty"), "");
        assert_eq!(clean_amount(""), "");
    }

    #[test]
    fn payment_steps_shape() {
        let steps = payment_steps("alice", "500 dollars");
        assert_eq!(steps.first(), Some(&FlowStep::Wait(APP_LOAD_DELAY)));

        let tap_count = steps.iter().filter(|s| matches!(s, FlowStep::Tap(..))).count();
        assert_eq!(tap_count, 12);

        let texts: Vec<_> = steps
            .iter()
            .filter_map(|s| match s {
                FlowStep::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["alice", "500"]);
        assert_eq!(steps.last(), Some(&FlowStep::Tap(300, 1100)));
    }

    #[test]
    fn calendar_clears_date_field_before_typing() {
        let steps = calendar_steps("dentist", "friday");
        let date_idx = steps
            .iter()
            .position(|s| *s == FlowStep::Text("friday".into()))
            .unwrap();
        assert_eq!(steps[date_idx - 1], FlowStep::Key(KeyCode::Delete));
        assert_eq!(steps[date_idx - 2], FlowStep::Key(KeyCode::Delete));
        assert_eq!(steps.last(), Some(&FlowStep::Tap(700, 100)));

        let tap_count = steps.iter().filter(|s| matches!(s, FlowStep::Tap(..))).count();
        assert_eq!(tap_count, 13);
    }
}
