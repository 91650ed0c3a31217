use axum::{extract::State, response::IntoResponse};
use maud::{DOCTYPE, PreEscaped, html};

use super::CSS;
use crate::AppState;

const SCRIPT: &str = r#"
    const fields = ["state", "prompt", "response", "error"];
    const conn = document.getElementById("connection");

    function render(status) {
        for (const name of fields) {
            document.getElementById("status-" + name).textContent = status[name] || "";
        }
    }

    function connect() {
        const scheme = location.protocol === "https:" ? "wss://" : "ws://";
        const ws = new WebSocket(scheme + location.host + "/ws");
        ws.onopen = () => { conn.textContent = "live"; };
        ws.onmessage = (msg) => render(JSON.parse(msg.data));
        ws.onclose = () => {
            conn.textContent = "disconnected, retrying";
            setTimeout(connect, 1000);
        };
    }

    document.getElementById("prompt-form").addEventListener("submit", async (e) => {
        e.preventDefault();
        const body = new URLSearchParams(new FormData(e.target));
        const reply = await fetch("/prompt", { method: "POST", body });
        render(await reply.json());
    });

    connect();
"#;

pub async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.tracker.status();

    html! {
        (DOCTYPE)
        html {
            head {
                title { "prompted" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(CSS)) }
            }
            body {
                main {
                    h1 { "prompted" }
                    p class="muted" { "observer: " span id="connection" { "connecting" } }
                    dl {
                        dt { "state" }
                        dd id="status-state" { (status.state) }
                        dt { "prompt" }
                        dd id="status-prompt" { (status.prompt) }
                        dt { "response" }
                        dd id="status-response" { (status.response) }
                        dt { "error" }
                        dd id="status-error" class="error" {}
                    }
                    form id="prompt-form" {
                        input type="text" name="prompt" placeholder="Ask something" autocomplete="off";
                        button type="submit" { "Send" }
                    }
                }
                script { (PreEscaped(SCRIPT)) }
            }
        }
    }
}
