// ABOUTME: Browser-facing result page shown after OAuth connect and invitation replies
// ABOUTME: Renders templates/result.html with the provider logo, the user's avatar, and a message

use askama::Template;
use base64::Engine;
use calbridge_core::ChatHost;

pub const GOOGLE_IMAGE_URL: &str =
    "https://collegeinfogeek.com/wp-content/uploads/2016/08/Google_Calendar_Logo.png";
pub const OUTLOOK_IMAGE_URL: &str =
    "https://images.techhive.com/images/article/2014/09/outlook-logo-100457446-large.jpg";
pub const DEFAULT_USER_IMAGE_URL: &str =
    "https://cdn.freebiesupply.com/logos/large/2x/mattermost-logo-png-transparent.png";

#[derive(Template)]
#[template(path = "result.html")]
pub struct ResultPage {
    pub provider_image: Option<&'static str>,
    pub user_image: String,
    pub message: String,
}

/// Logo for a provider name; unknown providers get none
pub fn provider_image(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "google" => Some(GOOGLE_IMAGE_URL),
        "live_connect" => Some(OUTLOOK_IMAGE_URL),
        _ => None,
    }
}

pub fn png_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

impl ResultPage {
    /// Build the page, embedding the user's avatar when the host has one
    pub async fn for_user(
        host: &dyn ChatHost,
        user_id: &str,
        message: &str,
        provider_name: &str,
    ) -> Self {
        let user_image = match host.profile_image(user_id).await {
            Ok(bytes) => png_data_uri(&bytes),
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "No profile image; using default");
                DEFAULT_USER_IMAGE_URL.to_string()
            }
        };
        Self {
            provider_image: provider_image(provider_name),
            user_image,
            message: message.to_string(),
        }
    }

    /// Render to HTML; falls back to the bare message if rendering fails
    pub fn to_html(&self) -> String {
        match self.render() {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render result page");
                self.message.clone()
            }
        }
    }
}
