use chrono::{DateTime, TimeZone, Utc};
use fd_schemas::{
    Customer, Driver, Paise, PaymentStatus, Shipment, ShipmentStatus, ShipmentWithRelations,
    Vehicle,
};
use uuid::Uuid;

/// 2024-01-01T00:00:00Z, the OTP timestamp used across scenarios.
pub fn otp_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builder for shipment rows. Defaults to an arrived, OTP-verified,
/// unpaid shipment worth ₹500 with a customer attached.
#[derive(Debug, Clone)]
pub struct ShipmentBuilder {
    row: ShipmentWithRelations,
}

impl Default for ShipmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShipmentBuilder {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let customer = Customer {
            id: Uuid::new_v4(),
            name: "Asha Traders".to_string(),
            phone_number: "9876543210".to_string(),
        };
        Self {
            row: ShipmentWithRelations {
                shipment: Shipment {
                    id,
                    shipment_number: format!("SHP-{}", &id.simple().to_string()[..6]),
                    status: ShipmentStatus::Arrived,
                    payment_status: None,
                    otp_verified_at: Some(otp_time()),
                    revenue: Some(Paise::from_rupees(500)),
                    phonepe_order_id: None,
                    start_location: "Pune".to_string(),
                    destination: "Mumbai".to_string(),
                    customer_id: Some(customer.id),
                    driver_id: None,
                    vehicle_id: None,
                    created_at: Utc::now(),
                },
                customer: Some(customer),
                driver: None,
                vehicle: None,
            },
        }
    }

    pub fn status(mut self, status: ShipmentStatus) -> Self {
        self.row.shipment.status = status;
        self
    }

    pub fn without_otp(mut self) -> Self {
        self.row.shipment.otp_verified_at = None;
        self
    }

    pub fn revenue(mut self, revenue: Option<Paise>) -> Self {
        self.row.shipment.revenue = revenue;
        self
    }

    pub fn payment(mut self, status: Option<PaymentStatus>, order_id: Option<&str>) -> Self {
        self.row.shipment.payment_status = status;
        self.row.shipment.phonepe_order_id = order_id.map(str::to_string);
        self
    }

    pub fn without_customer(mut self) -> Self {
        self.row.customer = None;
        self.row.shipment.customer_id = None;
        self
    }

    pub fn with_driver_and_vehicle(mut self) -> Self {
        let driver = Driver {
            id: Uuid::new_v4(),
            name: "Ravi Kumar".to_string(),
        };
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            r#type: "truck".to_string(),
            license_plate: Some("MH12AB1234".to_string()),
        };
        self.row.shipment.driver_id = Some(driver.id);
        self.row.shipment.vehicle_id = Some(vehicle.id);
        self.row.driver = Some(driver);
        self.row.vehicle = Some(vehicle);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.row.shipment.created_at = at;
        self
    }

    pub fn build(self) -> ShipmentWithRelations {
        self.row
    }
}

/// Shorthand for `ShipmentBuilder::new().status(status).build()`.
pub fn shipment(status: ShipmentStatus) -> ShipmentWithRelations {
    ShipmentBuilder::new().status(status).build()
}
