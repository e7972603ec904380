use crate::errors::AppError;
use crate::models::{PlanType, Service, ServiceCategory};

/// All money is integer paise. Rules per service follow the published
/// rate card: kitchen gardening at ₹300 per vegetable, plant rental at
/// ₹150/month plus a ₹1000 refundable deposit per plant (exactly 5 plants),
/// plant hostel billed per plant-day plus a pickup/drop charge.
pub const KITCHEN_UNIT_PAISE: i64 = 30_000;
pub const RENTAL_MONTHLY_FEE_PAISE: i64 = 15_000;
pub const RENTAL_DEPOSIT_PER_PLANT_PAISE: i64 = 100_000;
pub const RENTAL_PLANT_COUNT: i64 = 5;
pub const MONTHLY_MULTIPLIER: i64 = 4;

/// Default charge for a maintenance booking with no plan.
pub fn service_default_paise(service: &Service, minimum_charge_paise: i64) -> i64 {
    (service.price_min * 100).max(minimum_charge_paise)
}

/// Garden maintenance plans quoted off the service base: one visit at base
/// rate, or four visits a month.
pub fn maintenance_plan_paise(base_paise: i64, plan: PlanType) -> Result<i64, AppError> {
    let amount = match plan {
        PlanType::PerVisit => base_paise,
        PlanType::Monthly => base_paise * MONTHLY_MULTIPLIER,
        PlanType::None => {
            return Err(AppError::Validation("a plan must be selected".to_string()))
        }
    };
    require_positive(amount)
}

pub fn kitchen_gardening_paise(veg_count: i64) -> Result<i64, AppError> {
    if veg_count < 1 {
        return Err(AppError::Validation(
            "please enter how many vegetables (minimum 1)".to_string(),
        ));
    }
    require_positive(veg_count * KITCHEN_UNIT_PAISE)
}

/// First rental charge: one month's fee plus the full deposit.
pub fn plant_rental_first_charge_paise(plant_count: i64) -> Result<i64, AppError> {
    if plant_count != RENTAL_PLANT_COUNT {
        return Err(AppError::Validation(format!(
            "please select exactly {RENTAL_PLANT_COUNT} plants to rent"
        )));
    }
    require_positive(RENTAL_MONTHLY_FEE_PAISE + plant_count * RENTAL_DEPOSIT_PER_PLANT_PAISE)
}

pub fn plant_hostel_paise(
    plants: i64,
    days: i64,
    rate_per_day_rupees: i64,
    pickup_drop_rupees: i64,
) -> Result<i64, AppError> {
    if plants < 1 || days < 1 || rate_per_day_rupees < 1 || pickup_drop_rupees < 0 {
        return Err(AppError::Validation(
            "please enter valid hostel plants, days and charges".to_string(),
        ));
    }
    require_positive((rate_per_day_rupees * plants * days + pickup_drop_rupees) * 100)
}

fn require_positive(amount_paise: i64) -> Result<i64, AppError> {
    if amount_paise <= 0 {
        return Err(AppError::Validation(
            "computed amount must be positive".to_string(),
        ));
    }
    Ok(amount_paise)
}

/// Plan inputs as supplied by the booking request. Which fields are
/// required depends on the service being booked.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PlanInputs {
    pub plan_type: Option<String>,
    pub veg_count: Option<i64>,
    pub plant_count: Option<i64>,
    pub hostel_plants: Option<i64>,
    pub hostel_days: Option<i64>,
    pub hostel_rate_per_day: Option<i64>,
    pub hostel_pickup_drop_charge: Option<i64>,
    pub monthly_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanQuote {
    pub plan_type: PlanType,
    pub plan_price_paise: i64,
    pub monthly_day: Option<u32>,
    /// Whether the customer is sent to checkout right after booking.
    pub requires_immediate_payment: bool,
}

/// Quotes the plan for a booking request. Inspection-category services are
/// always free at booking time; payment opens after the inspection.
pub fn quote_for_service(service: &Service, inputs: &PlanInputs) -> Result<PlanQuote, AppError> {
    if service.category == ServiceCategory::Inspection {
        return Ok(PlanQuote {
            plan_type: PlanType::None,
            plan_price_paise: 0,
            monthly_day: None,
            requires_immediate_payment: false,
        });
    }

    match service.slug.as_str() {
        "kitchen-gardening" => {
            let plan = match inputs.plan_type.as_deref() {
                Some("PER_VISIT") => PlanType::PerVisit,
                Some("MONTHLY") => PlanType::Monthly,
                _ => {
                    return Err(AppError::Validation(
                        "please select a valid plan for kitchen gardening".to_string(),
                    ))
                }
            };
            let veg_count = inputs.veg_count.unwrap_or(0);
            let price = kitchen_gardening_paise(veg_count)?;
            let monthly_day = if plan == PlanType::Monthly {
                Some(required_monthly_day(inputs)?)
            } else {
                None
            };
            Ok(PlanQuote {
                plan_type: plan,
                plan_price_paise: price,
                monthly_day,
                // Monthly plans are charged on the chosen day via the
                // orders view, not at checkout.
                requires_immediate_payment: plan == PlanType::PerVisit,
            })
        }
        "plants-on-rent" => {
            let price = plant_rental_first_charge_paise(inputs.plant_count.unwrap_or(0))?;
            let monthly_day = required_monthly_day(inputs)?;
            Ok(PlanQuote {
                plan_type: PlanType::Monthly,
                plan_price_paise: price,
                monthly_day: Some(monthly_day),
                requires_immediate_payment: false,
            })
        }
        "plant-hostel-service" => {
            let price = plant_hostel_paise(
                inputs.hostel_plants.unwrap_or(0),
                inputs.hostel_days.unwrap_or(0),
                inputs.hostel_rate_per_day.unwrap_or(0),
                inputs.hostel_pickup_drop_charge.unwrap_or(0),
            )?;
            Ok(PlanQuote {
                plan_type: PlanType::PerVisit,
                plan_price_paise: price,
                monthly_day: None,
                requires_immediate_payment: true,
            })
        }
        // Plain maintenance services charge the service default at payment
        // time; no plan is recorded up front.
        _ => Ok(PlanQuote {
            plan_type: PlanType::None,
            plan_price_paise: 0,
            monthly_day: None,
            requires_immediate_payment: true,
        }),
    }
}

fn required_monthly_day(inputs: &PlanInputs) -> Result<u32, AppError> {
    match inputs.monthly_day {
        Some(day) if (1..=28).contains(&day) => Ok(day),
        _ => Err(AppError::Validation(
            "please choose a monthly payment date between 1 and 28".to_string(),
        )),
    }
}
