//! SMS channel.
//!
//! This module provides the [`SmsChannel`] trait and [`TwilioSms`], which
//! sends text messages through a Twilio-compatible REST gateway.

use std::time::Duration;

use log::{debug, info};
use mockall::automock;
use reqwest::Client;

use crate::{alerts::Channel, error::EngineError};

/// Sends a text message to a phone number.
///
/// Failures are reported, never raised: an invalid number or a rejected
/// request yields [`EngineError::ChannelDeliveryFailure`].
#[automock]
pub trait SmsChannel {
    async fn send(&self, phone_number: &str, message: &str) -> Result<(), EngineError>;
}

/// Whether `phone_number` looks like an E.164 number such as `+15551234567`.
fn is_e164(phone_number: &str) -> bool {
    let Some(digits) = phone_number.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && !digits.starts_with('0')
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Twilio-compatible SMS gateway.
///
/// # Examples
///
/// ```no_run
/// let sms = TwilioSms::new("https://api.twilio.com", "AC123", "token", "+15550000", Duration::from_secs(10));
/// sms.send("+15551234567", "ALERT: ...").await?;
/// ```
pub struct TwilioSms {
    /// Gateway base url
    url: String,
    account_sid: String,
    auth_token: String,
    /// Sender phone number
    from: String,
    client: Client,
    timeout: Duration,
}

impl TwilioSms {
    /// Create a new [TwilioSms].
    ///
    /// # Arguments
    ///
    /// * `url` - Gateway base url, without the `/2010-04-01` path.
    /// * `account_sid` - Account used for basic auth and in the request path.
    /// * `auth_token` - Basic auth password.
    /// * `from` - Sender phone number.
    /// * `timeout` - Upper bound for one request.
    pub fn new(
        url: &str,
        account_sid: &str,
        auth_token: &str,
        from: &str,
        timeout: Duration,
    ) -> Self {
        TwilioSms {
            url: url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from: from.to_string(),
            client: Client::new(),
            timeout,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.url, self.account_sid
        )
    }
}

impl SmsChannel for TwilioSms {
    /// Post the message form to `{url}/2010-04-01/Accounts/{sid}/Messages.json`.
    async fn send(&self, phone_number: &str, message: &str) -> Result<(), EngineError> {
        if !is_e164(phone_number) {
            return Err(EngineError::delivery(
                Channel::Sms,
                format!("invalid phone number {}", phone_number),
            ));
        }

        debug!("request {}", self.messages_url());

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", phone_number),
                ("From", self.from.as_str()),
                ("Body", message),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EngineError::delivery(Channel::Sms, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::delivery(
                Channel::Sms,
                format!("gateway returned {}", status),
            ));
        }

        info!("sms sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn create_test_sms(url: &str) -> TwilioSms {
        TwilioSms::new(url, "AC123", "secret", "+15550000000", Duration::from_secs(5))
    }

    #[test]
    fn test_is_e164() {
        assert!(is_e164("+15551234567"));
        assert!(is_e164("+919876543210"));
        assert!(!is_e164("15551234567"));
        assert!(!is_e164("+1555"));
        assert!(!is_e164("+1555-123-4567"));
        assert!(!is_e164("+05551234567"));
        assert!(!is_e164(""));
    }

    #[tokio::test]
    async fn test_send() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".to_string(), "+15551234567".to_string()),
                Matcher::UrlEncoded("From".to_string(), "+15550000000".to_string()),
                Matcher::UrlEncoded("Body".to_string(), "ALERT: fire".to_string()),
            ]))
            .with_status(201)
            .create_async()
            .await;

        let sms = create_test_sms(&server.url());
        sms.send("+15551234567", "ALERT: fire").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_gateway_error() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(500)
            .create_async()
            .await;

        let sms = create_test_sms(&server.url());

        assert_eq!(
            sms.send("+15551234567", "ALERT: fire").await,
            Err(EngineError::delivery(
                Channel::Sms,
                "gateway returned 500 Internal Server Error"
            ))
        );
    }

    #[tokio::test]
    async fn test_send_invalid_number_skips_gateway() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let sms = create_test_sms(&server.url());

        assert!(matches!(
            sms.send("not-a-number", "ALERT: fire").await,
            Err(EngineError::ChannelDeliveryFailure {
                channel: Channel::Sms,
                ..
            })
        ));
        mock.assert_async().await;
    }
}
