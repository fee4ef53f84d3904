use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::error::Error;

use crate::config::SmtpSettings;
use crate::notify::{NotifyError, Notifier};

/// Notifier that delivers through an SMTP relay.
pub struct Mailer {
    smtp: SmtpTransport,
    from: String,
}

impl Mailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, Box<dyn Error>> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let tls_parameters = TlsParameters::new(settings.host.clone())?;

        // 465 speaks TLS from the first byte, anything else upgrades with STARTTLS
        let tls = if settings.port == 465 {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Required(tls_parameters)
        };
        let smtp = SmtpTransport::relay(&settings.host)?
            .credentials(creds)
            .port(settings.port)
            .tls(tls)
            .build();

        let from = if settings.from.trim().is_empty() {
            settings.username.clone()
        } else {
            settings.from.clone()
        };
        Ok(Mailer { smtp, from })
    }

    fn deliver(&self, to_email: &str, subject: &str, body: &str) -> Result<(), Box<dyn Error>> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .body(body.to_string())?;

        self.smtp.send(&email)?;
        Ok(())
    }
}

impl Notifier for Mailer {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.deliver(recipient, subject, body)
            .map_err(|e| NotifyError(e.to_string()))
    }
}
