//! Output formatting for device state.

use anyhow::Result;
use prana_types::{DeviceState, Fan};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Multi-line human readable state.
pub fn format_state_text(state: &DeviceState) -> String {
    let mut out = String::new();
    out.push_str(&format!("Power:         {}\n", on_off(state.power)));
    for fan in Fan::ALL {
        out.push_str(&format!(
            "Fan {:<4}      {} (speed {})\n",
            format!("{}:", fan),
            on_off(state.fan_power(fan)),
            state.fan_speed(fan)
        ));
    }
    out.push_str(&format!(
        "Mode:          {}\n",
        state.mode.map_or("none", |m| m.as_str())
    ));
    out.push_str(&format!("Flows locked:  {}\n", on_off(state.flows_locked)));
    out.push_str(&format!("Winter mode:   {}\n", on_off(state.winter_mode)));
    out.push_str(&format!("Mini heating:  {}\n", on_off(state.mini_heating)));
    out.push_str(&format!("Brightness:    {}\n", state.brightness));
    out.push_str(&format!(
        "Display:       {}\n",
        state.display.map_or("unknown", |d| d.as_str())
    ));
    out.push_str(&format!("Temp inside:   {:.1} °C\n", state.temp_in));
    out.push_str(&format!("Temp exhaust:  {:.1} °C\n", state.temp_out));
    out.push_str(&format!("Temp outside:  {:.1} °C\n", state.temp_outside));
    out.push_str(&format!("Humidity:      {} %\n", state.humidity));
    out.push_str(&format!("CO2:           {} ppm\n", state.co2));
    out.push_str(&format!("TVOC:          {} ppb\n", state.tvoc));
    out.push_str(&format!("Pressure:      {} hPa\n", state.pressure));
    out
}

#[derive(Serialize)]
struct StateRecord<'a> {
    device: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    captured_at: OffsetDateTime,
    #[serde(flatten)]
    state: &'a DeviceState,
}

/// JSON object with device address, capture time and state fields.
pub fn format_state_json(
    device: &str,
    captured_at: OffsetDateTime,
    state: &DeviceState,
    pretty: bool,
) -> Result<String> {
    let record = StateRecord {
        device,
        captured_at,
        state,
    };
    let json = if pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    Ok(json)
}

/// One line per state for `watch`.
pub fn format_watch_line(captured_at: OffsetDateTime, state: &DeviceState) -> String {
    let timestamp = captured_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| captured_at.unix_timestamp().to_string());
    format!("[{}] {}", timestamp, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prana_types::DeviceState;

    fn sample_state() -> DeviceState {
        let mut frame = vec![0u8; prana_types::STATE_FRAME_LEN];
        frame[0] = 0xBE;
        frame[1] = 0xEF;
        DeviceState::from_bytes(&frame).unwrap()
    }

    #[test]
    fn test_text_lists_every_fan() {
        let text = format_state_text(&sample_state());
        assert!(text.contains("Power:         off"));
        assert!(text.contains("Fan main:"));
        assert!(text.contains("Fan in:"));
        assert!(text.contains("Fan out:"));
        assert!(text.contains("Mode:          none"));
    }

    #[test]
    fn test_json_flattens_state() {
        let captured_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let json = format_state_json("AA:BB", captured_at, &sample_state(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["device"], "AA:BB");
        assert_eq!(value["captured_at"], "2023-11-14T22:13:20Z");
        assert_eq!(value["power"], false);
        assert!(value.get("co2").is_some());
    }

    #[test]
    fn test_watch_line_has_timestamp() {
        let captured_at = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let line = format_watch_line(captured_at, &sample_state());
        assert!(line.starts_with("[1970-01-01T00:00:00Z] power=off"));
    }
}
