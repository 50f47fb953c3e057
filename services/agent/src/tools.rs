//! Local tools declared to the remote agent.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;
use voicelink_session::Tool;
use voicelink_wire::{ParameterSchema, PropertySchema, ToolResult};

/// A geographic point in a requested route.
#[derive(Deserialize, Debug, Clone)]
pub struct RoutePoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl RoutePoint {
    fn describe(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{:.4}, {:.4}", self.lat, self.lng),
        }
    }
}

/// A route the remote agent asked to display.
#[derive(Deserialize, Debug, Clone)]
pub struct RouteRequest {
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    #[serde(default)]
    pub waypoints: Vec<RoutePoint>,
}

fn maps_url(route: &RouteRequest) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&origin={},{}&destination={},{}&travelmode=driving",
        route.origin.lat, route.origin.lng, route.destination.lat, route.destination.lng
    )
}

/// `show_route`: stores the requested route as display state and hands the
/// remote model a directions link it can relay to the caller.
#[derive(Default)]
pub struct NavigationTool {
    route: Mutex<Option<RouteRequest>>,
}

impl NavigationTool {
    pub fn new() -> Self {
        Self::default()
    }

    fn route_lock(&self) -> MutexGuard<'_, Option<RouteRequest>> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A printable description of the currently displayed route.
    pub fn current_route(&self) -> Option<String> {
        let guard = self.route_lock();
        let route = guard.as_ref()?;
        let mut text = format!("route: {}", route.origin.describe());
        for stop in &route.waypoints {
            let _ = write!(text, " -> {}", stop.describe());
        }
        let _ = write!(text, " -> {}", route.destination.describe());
        let _ = write!(text, "\n{}", maps_url(route));
        Some(text)
    }
}

#[async_trait]
impl Tool for NavigationTool {
    fn name(&self) -> &str {
        "show_route"
    }

    fn description(&self) -> &str {
        "Display a driving route to the caller. Use this whenever the caller asks for \
         directions or wants to see the way between two places."
    }

    fn parameters(&self) -> ParameterSchema {
        let point = |description: &str| {
            PropertySchema::object(
                description,
                [
                    ("lat", PropertySchema::number("Latitude in decimal degrees")),
                    ("lng", PropertySchema::number("Longitude in decimal degrees")),
                    ("label", PropertySchema::string("Human-readable place name")),
                ],
                ["lat", "lng"],
            )
        };
        ParameterSchema::object(
            [
                ("origin", point("Starting point of the route")),
                ("destination", point("Final destination")),
                (
                    "waypoints",
                    PropertySchema::array(
                        "Intermediate stops, in visiting order",
                        point("One intermediate stop"),
                    ),
                ),
            ],
            ["origin", "destination"],
        )
    }

    async fn invoke(&self, arguments: serde_json::Value) -> ToolResult {
        let route: RouteRequest = match serde_json::from_value(arguments) {
            Ok(route) => route,
            Err(err) => return ToolResult::failed(format!("route arguments were invalid: {err}")),
        };
        info!(
            origin = %route.origin.describe(),
            destination = %route.destination.describe(),
            stops = route.waypoints.len(),
            "route displayed"
        );
        let message = format!(
            "Route displayed from {} to {} with {} intermediate stops. Directions: {}",
            route.origin.describe(),
            route.destination.describe(),
            route.waypoints.len(),
            maps_url(&route)
        );
        *self.route_lock() = Some(route);
        ToolResult::ok(message)
    }

    fn reset(&self) {
        self.route_lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn valid_route_is_stored_and_linked() {
        let tool = NavigationTool::new();
        let result = tool
            .invoke(json!({
                "origin": {"lat": 33.749, "lng": -84.388, "label": "Atlanta"},
                "destination": {"lat": 33.9526, "lng": -84.5499, "label": "Marietta"},
                "waypoints": [{"lat": 33.8, "lng": -84.4}]
            }))
            .await;

        assert!(result.success);
        assert!(result.message.contains("Atlanta"));
        assert!(result.message.contains("google.com/maps/dir"));

        let displayed = tool.current_route().expect("route should be displayed");
        assert!(displayed.contains("Atlanta"));
        assert!(displayed.contains("Marietta"));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_without_side_effects() {
        let tool = NavigationTool::new();
        let result = tool.invoke(json!({"origin": "downtown"})).await;

        assert!(!result.success);
        assert!(tool.current_route().is_none());
    }

    #[tokio::test]
    async fn reset_clears_the_displayed_route() {
        let tool = NavigationTool::new();
        tool.invoke(json!({
            "origin": {"lat": 1.0, "lng": 2.0},
            "destination": {"lat": 3.0, "lng": 4.0}
        }))
        .await;
        assert!(tool.current_route().is_some());

        tool.reset();
        assert!(tool.current_route().is_none());
    }
}
