use chrono::{DateTime, Utc};
use tera::{Context, Tera};

use crate::domain::request::TireRequest;
use crate::domain::supplier::Supplier;
use crate::gateway::OrderMessage;

const TEMPLATE_NAME: &str = "order_email.txt";
const NOT_AVAILABLE: &str = "N/A";

/// Renders supplier order notifications from the bundled plain-text template.
/// Rendering is deterministic for a given request, supplier, notes and date.
pub struct OrderMessageRenderer {
    tera: Tera,
    sender_name: String,
}

impl OrderMessageRenderer {
    pub fn new(sender_name: impl Into<String>) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../../templates/order_email.txt"))?;
        Ok(Self { tera, sender_name: sender_name.into() })
    }

    pub fn subject(request: &TireRequest) -> String {
        format!(
            "Tire Order Request - Vehicle {} - Request #{}",
            request.vehicle.vehicle_number, request.id
        )
    }

    pub fn render(
        &self,
        request: &TireRequest,
        supplier: &Supplier,
        order_notes: Option<&str>,
        order_date: DateTime<Utc>,
    ) -> Result<OrderMessage, tera::Error> {
        let mut context = Context::new();
        context.insert("supplier_name", &supplier.name);

        context.insert("vehicle_number", &request.vehicle.vehicle_number);
        context.insert("vehicle_brand", &request.vehicle.brand);
        context.insert("vehicle_model", &request.vehicle.model);
        context.insert("vehicle_year", &request.vehicle.year);

        context.insert("tire_size_required", &request.tires.tire_size_required);
        context.insert("quantity", &request.tires.quantity);
        context.insert("tubes_quantity", &request.tires.tubes_quantity);
        context.insert("existing_tire_make", &request.tires.existing_tire_make);

        context.insert("present_km", &group_thousands(request.odometer.present_km));
        context.insert("previous_km", &group_thousands(request.odometer.previous_km));
        context.insert(
            "last_replacement_date",
            &request.odometer.last_replacement_date.format("%Y-%m-%d").to_string(),
        );
        context.insert("tire_wear_pattern", &request.tires.tire_wear_pattern);

        context.insert("requester_name", &request.requester.name);
        context.insert("requester_email", &request.requester.email);
        context.insert("requester_phone", &request.requester.phone);
        context.insert("requester_section", &request.requester.section);
        context.insert("cost_center", &request.requester.cost_center);

        context.insert("request_id", &request.id.0);
        context.insert("request_reason", &request.request_reason);
        context.insert("comments", or_not_available(request.comments.as_deref()));
        context.insert("order_notes", or_not_available(order_notes));

        context.insert("supervisor_notes", or_not_available(request.notes.supervisor.as_deref()));
        context.insert(
            "technical_manager_notes",
            or_not_available(request.notes.technical_manager.as_deref()),
        );
        context.insert("engineer_notes", or_not_available(request.notes.engineer.as_deref()));

        context.insert("sender_name", &self.sender_name);
        context.insert("order_date", &order_date.format("%Y-%m-%d %H:%M:%S UTC").to_string());

        let body = self.tera.render(TEMPLATE_NAME, &context)?;

        Ok(OrderMessage {
            reply_to: request.requester.email.clone(),
            subject: Self::subject(request),
            body: body.trim().to_string(),
        })
    }
}

fn or_not_available(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => NOT_AVAILABLE,
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
