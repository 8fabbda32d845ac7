//! Correlated generation context.
//!
//! Some fields of a flight document must agree with each other: the seat
//! count on the equipment, the number of passengers on board and the seats
//! left. The context is drawn once per document and every field reads from it.

use crate::generators::words;
use bson::{doc, Bson, Document};
use rand::seq::SliceRandom;
use rand::Rng;

pub const PLANE_TYPES: &[&str] = &[
    "Boeing 737",
    "Airbus A320",
    "Embraer E190",
    "Bombardier CRJ900",
    "Boeing 777",
    "Airbus A350",
];

pub const AMENITIES: &[&str] = &[
    "WiFi",
    "TV",
    "Power outlets",
    "Hot meals",
    "Priority boarding",
    "Extra legroom",
];

const MIN_TOTAL_SEATS: i32 = 10;
const MAX_TOTAL_SEATS: i32 = 50;
const SEAT_LETTERS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F'];

// Used by context-dependent generators when a document has no context.
const DEFAULT_PLANE_TYPE: &str = "Airbus A320";
const DEFAULT_TOTAL_SEATS: i32 = 100;
const DEFAULT_PASSENGERS: i32 = 10;

/// Aircraft facts shared by the fields of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftContext {
    pub plane_type: &'static str,
    pub total_seats: i32,
    pub num_passengers: i32,
    pub seats_available: i32,
}

impl AircraftContext {
    /// Draw a plane, its capacity and a passenger load. At least one seat is
    /// always occupied.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let plane_type = PLANE_TYPES.choose(rng).copied().unwrap_or(DEFAULT_PLANE_TYPE);
        let total_seats = rng.gen_range(MIN_TOTAL_SEATS..=MAX_TOTAL_SEATS);
        let num_passengers = rng.gen_range(1..=total_seats);
        Self {
            plane_type,
            total_seats,
            num_passengers,
            seats_available: total_seats - num_passengers,
        }
    }
}

/// Per-document generation context.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub aircraft: Option<AircraftContext>,
}

impl GenerationContext {
    pub fn with_aircraft(aircraft: AircraftContext) -> Self {
        Self {
            aircraft: Some(aircraft),
        }
    }

    pub fn plane_type(&self) -> &'static str {
        self.aircraft
            .as_ref()
            .map_or(DEFAULT_PLANE_TYPE, |a| a.plane_type)
    }

    pub fn total_seats(&self) -> i32 {
        self.aircraft
            .as_ref()
            .map_or(DEFAULT_TOTAL_SEATS, |a| a.total_seats)
    }

    pub fn num_passengers(&self) -> i32 {
        self.aircraft
            .as_ref()
            .map_or(DEFAULT_PASSENGERS, |a| a.num_passengers)
    }

    pub fn seats_available(&self) -> i32 {
        self.aircraft.as_ref().map_or(0, |a| a.seats_available)
    }
}

/// Equipment sub-document: plane type, capacity and 2 to 5 amenities.
pub fn equipment<R: Rng + ?Sized>(rng: &mut R, ctx: &GenerationContext) -> Bson {
    let count = rng.gen_range(2..=5);
    let amenities: Vec<Bson> = AMENITIES
        .choose_multiple(rng, count)
        .map(|a| Bson::String((*a).to_string()))
        .collect();
    Bson::Document(doc! {
        "plane_type": ctx.plane_type(),
        "total_seats": ctx.total_seats(),
        "amenities": amenities,
    })
}

/// Passenger list with unique seat assignments.
///
/// Seats are laid out row by row (`1A`..`1F`, `2A`, ...) up to the plane's
/// capacity, shuffled, and handed out one per passenger.
pub fn passengers<R: Rng + ?Sized>(rng: &mut R, ctx: &GenerationContext) -> Bson {
    let total = ctx.total_seats().max(1) as usize;
    let count = (ctx.num_passengers().max(1) as usize).min(total);

    let mut seats: Vec<String> = (0..total)
        .map(|i| {
            let row = i / SEAT_LETTERS.len() + 1;
            format!("{row}{}", SEAT_LETTERS[i % SEAT_LETTERS.len()])
        })
        .collect();
    seats.shuffle(rng);

    let passengers: Vec<Bson> = seats
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, seat)| {
            let passenger: Document = doc! {
                "passenger_id": (i + 1) as i32,
                "name": words::full_name(rng),
                "ticket_number": format!("TCK-{:08}", rng.gen_range(1..=99_999_999)),
                "seat_number": seat,
            };
            Bson::Document(passenger)
        })
        .collect();
    Bson::Array(passengers)
}
