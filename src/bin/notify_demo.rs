//! Demo that pushes one fake transition through the notifier (errors only
//! logged when no webhook is configured).

use chrono::Utc;
use release_monitor::notify::discord::DiscordNotifier;
use release_monitor::notify::Notify;
use release_monitor::{ExtractionRule, SourceDescriptor, Transition};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();
    let _ = dotenvy::dotenv();

    let webhook = std::env::var("DISCORD_WEBHOOK_URL").ok();
    let quiet = true; // demo never tags the audience
    let notifier = DiscordNotifier::new(webhook, quiet);

    let transition = Transition {
        source: SourceDescriptor {
            id: "appstore".into(),
            title: "App Store release".into(),
            url: "https://itunes.apple.com/lookup?bundleId=com.example.app".into(),
            rule: ExtractionRule::AppStoreLookup {
                bundle_id: "com.example.app".into(),
            },
            link: Some("https://apps.apple.com/app/id000000000".into()),
            color: 3447003,
        },
        old: "59.0".into(),
        new: "60.0".into(),
        detected_at: Utc::now(),
    };

    match notifier.dispatch(&transition).await {
        Ok(()) => println!("notify-demo sent"),
        Err(e) => tracing::warn!(error = %e, "notify-demo delivery failed"),
    }
}
