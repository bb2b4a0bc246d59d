use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::AdminState;
use crate::load_balancer::server::ServerView;
use crate::registry::NamedClient;
use crate::stats::{ServerStatsView, ZoneSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub clients: usize,
}

#[derive(Serialize)]
pub struct ClientSummary {
    pub name: String,
    pub rule: &'static str,
    pub servers: usize,
    pub reachable: usize,
}

#[derive(Serialize)]
pub struct HealthChange {
    pub server: String,
    pub alive: bool,
    pub changed: bool,
}

fn client(state: &AdminState, name: &str) -> Result<Arc<NamedClient>, StatusCode> {
    state.registry.get(name).ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        clients: state.registry.len(),
    })
}

pub async fn list_clients(State(state): State<AdminState>) -> Json<Vec<ClientSummary>> {
    let summaries = state
        .registry
        .names()
        .into_iter()
        .filter_map(|name| state.registry.get(&name))
        .map(|c| {
            let lb = c.load_balancer();
            ClientSummary {
                name: c.name().to_string(),
                rule: lb.rule_name(),
                servers: lb.all_servers().len(),
                reachable: lb.reachable_servers().len(),
            }
        })
        .collect();
    Json(summaries)
}

pub async fn get_servers(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ServerView>>, StatusCode> {
    let client = client(&state, &name)?;
    let views = client.load_balancer().all_servers().iter().map(|s| s.view()).collect();
    Ok(Json(views))
}

pub async fn get_stats(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ServerStatsView>>, StatusCode> {
    let client = client(&state, &name)?;
    let lb = client.load_balancer();
    let views = lb.all_servers().iter().map(|s| lb.server_stats(s)).collect();
    Ok(Json(views))
}

pub async fn get_zones(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ZoneSnapshot>>, StatusCode> {
    let client = client(&state, &name)?;
    let mut zones: Vec<ZoneSnapshot> = client.load_balancer().zone_snapshots().into_values().collect();
    zones.sort_by(|a, b| a.zone.cmp(&b.zone));
    Ok(Json(zones))
}

pub async fn mark_down(
    State(state): State<AdminState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<HealthChange>, StatusCode> {
    set_alive(&state, &name, &id, false)
}

pub async fn mark_up(
    State(state): State<AdminState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<HealthChange>, StatusCode> {
    set_alive(&state, &name, &id, true)
}

fn set_alive(state: &AdminState, name: &str, id: &str, alive: bool) -> Result<Json<HealthChange>, StatusCode> {
    let client = client(state, name)?;
    let lb = client.load_balancer();
    let server = lb.find(id).ok_or(StatusCode::NOT_FOUND)?;
    let changed = server.is_alive() != alive;
    if alive {
        lb.mark_up(id);
    } else {
        lb.mark_down(id);
    }
    tracing::info!(client = %name, server = %id, alive, changed, "Server health set via admin API");
    Ok(Json(HealthChange {
        server: id.to_string(),
        alive,
        changed,
    }))
}
