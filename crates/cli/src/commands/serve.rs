//! `codeloop serve`: Start the HTTP API server.

use codeloop_gateway::GatewayState;
use codeloop_providers::BackendKind;

use crate::app::App;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = App::load()?;

    if let Some(port) = port_override {
        app.config.gateway.port = port;
    }

    let available = app.orchestrator.backends().available();
    println!("codeloop gateway");
    println!("   Listening: {}:{}", app.config.gateway.host, app.config.gateway.port);
    for kind in BackendKind::ALL {
        let status = if available.contains(&kind) { "ready" } else { "not configured" };
        println!("   {:<10} {status}", kind.as_str());
    }
    println!("   Files:     {} seeded", app.files.len());

    app.spawn_event_log();

    let state = GatewayState::new(app.orchestrator.clone(), app.files.clone());
    codeloop_gateway::serve(state, &app.config.gateway.host, app.config.gateway.port).await
}
