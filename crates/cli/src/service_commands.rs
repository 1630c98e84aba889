//! `danmu services`: manage capture jobs on the remote service.

use {
    anyhow::Result,
    clap::Subcommand,
    danmu_client::{ControlClient, Service},
    danmu_config::ServerConfig,
};

#[derive(Subcommand)]
pub enum ServiceAction {
    /// List running capture jobs.
    List {
        /// Only jobs on this platform.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Start capturing a room.
    Start {
        #[arg(long)]
        platform: String,
        #[arg(long)]
        rid: String,
        /// Login cookie for platforms that need one.
        #[arg(long, env = "DANMU_COOKIE")]
        cookie: Option<String>,
    },
    /// Stop capturing a room.
    Stop {
        #[arg(long)]
        platform: String,
        #[arg(long)]
        rid: String,
    },
}

pub fn control_client(server: &ServerConfig) -> Result<ControlClient> {
    Ok(ControlClient::new(
        server.api_address.clone(),
        server.api_token.clone(),
    )?)
}

pub async fn handle_services(action: ServiceAction, server: &ServerConfig) -> Result<()> {
    let client = control_client(server)?;
    match action {
        ServiceAction::List { platform } => {
            let services = match platform {
                Some(platform) => client.platform_services(&platform).await?,
                None => client.services().await?,
            };
            if services.is_empty() {
                println!("No running services.");
            }
            for service in &services {
                println!("{}", describe(service));
            }
        },
        ServiceAction::Start {
            platform,
            rid,
            cookie,
        } => {
            let service = client
                .start_service(&platform, &rid, cookie.as_deref())
                .await?;
            println!("Started {}", describe(&service));
        },
        ServiceAction::Stop { platform, rid } => {
            let service = client.stop_service(&platform, &rid).await?;
            println!("Stopped {}", describe(&service));
        },
    }
    Ok(())
}

fn describe(service: &Service) -> String {
    format!("{}/{}", service.platform, service.rid)
}
