//! Transactional email: order confirmations and corporate invoices.
//!
//! Uses SMTP via lettre for delivery with Askama templates (HTML and plain
//! text alternatives).

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use thiserror::Error;

use florist_core::invoice::CorporateInvoice;
use florist_core::order::Order;

use crate::config::EmailConfig;

/// One line of an email summary table.
struct EmailLine {
    label: String,
    quantity: u32,
    amount: String,
}

/// HTML template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    lines: &'a [EmailLine],
    total: &'a str,
    delivery_date: Option<String>,
    address: &'a str,
    city: &'a str,
    order_url: &'a str,
}

/// Plain text template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer_name: &'a str,
    order_number: &'a str,
    lines: &'a [EmailLine],
    total: &'a str,
    delivery_date: Option<String>,
    address: &'a str,
    city: &'a str,
    order_url: &'a str,
}

/// HTML template for a corporate invoice.
#[derive(Template)]
#[template(path = "email/invoice.html")]
struct InvoiceHtml<'a> {
    recipient_name: &'a str,
    company: &'a str,
    invoice_number: &'a str,
    period: String,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    vat_rate: String,
    vat_amount: &'a str,
    total: &'a str,
    due_date: String,
    invoices_url: &'a str,
}

/// Plain text template for a corporate invoice.
#[derive(Template)]
#[template(path = "email/invoice.txt")]
struct InvoiceText<'a> {
    recipient_name: &'a str,
    company: &'a str,
    invoice_number: &'a str,
    period: String,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    vat_rate: String,
    vat_amount: &'a str,
    total: &'a str,
    due_date: String,
    invoices_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// SMTP is not configured on this deployment.
    #[error("email is not configured")]
    NotConfigured,
}

/// Recipient details for an invoice email.
#[derive(Debug, Clone, Copy)]
pub struct InvoiceRecipient<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub company: &'a str,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Send the confirmation for a newly placed order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &Order) -> Result<(), MailerError> {
        let lines = order_lines(order);
        let total = format_amount(order.total_amount);
        let order_url = format!("{}/commandes/{}", self.base_url, order.id);
        let delivery_date = order
            .delivery
            .delivery_date
            .map(|d| d.format("%d/%m/%Y").to_string());

        let html = OrderConfirmationHtml {
            customer_name: &order.customer.name,
            order_number: &order.order_number,
            lines: &lines,
            total: &total,
            delivery_date: delivery_date.clone(),
            address: &order.delivery.address,
            city: &order.delivery.city,
            order_url: &order_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            customer_name: &order.customer.name,
            order_number: &order.order_number,
            lines: &lines,
            total: &total,
            delivery_date,
            address: &order.delivery.address,
            city: &order.delivery.city,
            order_url: &order_url,
        }
        .render()?;

        self.send_multipart_email(
            order.customer.email.as_str(),
            &format!("Confirmation de votre commande {}", order.order_number),
            &text,
            &html,
        )
        .await
    }

    /// Send (or resend) a corporate invoice.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_invoice(
        &self,
        invoice: &CorporateInvoice,
        recipient: InvoiceRecipient<'_>,
    ) -> Result<(), MailerError> {
        let totals = invoice.compute_totals();
        let lines = invoice_lines(invoice);
        let subtotal = format_amount(totals.subtotal);
        let vat_amount = format_amount(totals.vat_amount);
        let total = format_amount(totals.total_amount);
        let invoices_url = format!("{}/entreprise/factures/{}", self.base_url, invoice.id);
        let due_date = invoice.due_date.format("%d/%m/%Y").to_string();

        let html = InvoiceHtml {
            recipient_name: recipient.name,
            company: recipient.company,
            invoice_number: &invoice.invoice_number,
            period: invoice.period.to_string(),
            lines: &lines,
            subtotal: &subtotal,
            vat_rate: invoice.vat_rate.percent().normalize().to_string(),
            vat_amount: &vat_amount,
            total: &total,
            due_date: due_date.clone(),
            invoices_url: &invoices_url,
        }
        .render()?;
        let text = InvoiceText {
            recipient_name: recipient.name,
            company: recipient.company,
            invoice_number: &invoice.invoice_number,
            period: invoice.period.to_string(),
            lines: &lines,
            subtotal: &subtotal,
            vat_rate: invoice.vat_rate.percent().normalize().to_string(),
            vat_amount: &vat_amount,
            total: &total,
            due_date,
            invoices_url: &invoices_url,
        }
        .render()?;

        self.send_multipart_email(
            recipient.email,
            &format!(
                "Facture {} - {}",
                invoice.invoice_number, invoice.period
            ),
            &text,
            &html,
        )
        .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), MailerError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailerError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailerError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn order_lines(order: &Order) -> Vec<EmailLine> {
    order
        .items
        .iter()
        .map(|item| EmailLine {
            label: item.name.clone(),
            quantity: item.quantity,
            amount: format_amount(item.line_total()),
        })
        .collect()
}

fn invoice_lines(invoice: &CorporateInvoice) -> Vec<EmailLine> {
    invoice
        .lines
        .iter()
        .map(|line| EmailLine {
            label: format!(
                "{} du {}",
                line.order_number,
                line.order_date.format("%d/%m/%Y")
            ),
            quantity: 1,
            amount: format_amount(line.amount),
        })
        .collect()
}

/// French-style amount: `1234.5` becomes `1234,50 €`.
fn format_amount(amount: Decimal) -> String {
    format!("{amount:.2} €").replace('.', ",")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::new(425, 1)), "42,50 €");
        assert_eq!(format_amount(Decimal::ZERO), "0,00 €");
    }

    #[test]
    fn test_order_confirmation_renders_lines() {
        let lines = vec![
            EmailLine {
                label: "Bouquet de pivoines".to_owned(),
                quantity: 2,
                amount: format_amount(Decimal::new(9000, 2)),
            },
            EmailLine {
                label: "Carte message".to_owned(),
                quantity: 1,
                amount: format_amount(Decimal::new(350, 2)),
            },
        ];
        let text = OrderConfirmationText {
            customer_name: "Camille Martin",
            order_number: "CMD-2026-000042",
            lines: &lines,
            total: "93,50 €",
            delivery_date: Some("14/02/2026".to_owned()),
            address: "3 rue des Lilas",
            city: "Étampes",
            order_url: "https://fleurs.example.fr/commandes/42",
        }
        .render()
        .unwrap();

        assert!(text.contains("CMD-2026-000042"));
        assert!(text.contains("Bouquet de pivoines"));
        assert!(text.contains("90,00 €"));
        assert!(text.contains("93,50 €"));
        assert!(text.contains("14/02/2026"));
    }

    #[test]
    fn test_order_confirmation_without_delivery_date() {
        let html = OrderConfirmationHtml {
            customer_name: "Camille Martin",
            order_number: "CMD-2026-000043",
            lines: &[],
            total: "0,00 €",
            delivery_date: None,
            address: "3 rue des Lilas",
            city: "Étampes",
            order_url: "https://fleurs.example.fr/commandes/43",
        }
        .render()
        .unwrap();

        assert!(html.contains("CMD-2026-000043"));
        assert!(!html.contains("Livraison prévue le"));
    }
}
