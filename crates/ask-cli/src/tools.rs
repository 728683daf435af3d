//! Demo tools offered to the model unless `--no-tools` is given.

use ask_core::Tool;

pub const WEATHER_FORECAST: &str = "Today's weather: Light rain, 15°C. Tomorrow's weather: Sunny, 20°C. Day after tomorrow's weather: Cloudy, 18°C.";

pub fn demo_tools() -> Vec<Tool> {
    vec![current_time(), weather()]
}

/// Local time as RFC 3339, e.g. `2025-03-01T09:30:00+09:00`.
pub fn current_time() -> Tool {
    Tool::new(
        "currentTime",
        "Get the current date and time with timezone in a human-readable format.",
        |_args| chrono::Local::now().to_rfc3339(),
    )
}

pub fn weather() -> Tool {
    Tool::new(
        "getWeather",
        "Get the weather information for today, tomorrow, and the day after tomorrow.",
        |_args| WEATHER_FORECAST.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_tool_names() {
        let names: Vec<String> = demo_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["currentTime", "getWeather"]);
    }

    #[test]
    fn test_current_time_is_rfc3339() {
        let output = current_time().call("{}");
        assert!(chrono::DateTime::parse_from_rfc3339(&output).is_ok(), "{}", output);
    }

    #[test]
    fn test_weather_ignores_arguments() {
        let tool = weather();
        assert_eq!(tool.call(""), WEATHER_FORECAST);
        assert_eq!(tool.call(r#"{"city":"Tokyo"}"#), WEATHER_FORECAST);
    }
}
