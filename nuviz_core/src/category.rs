//! Object category mapping and display palette.
//!
//! nuScenes labels (`vehicle.car`, `human.pedestrian.adult`, ...) collapse
//! onto the ten detection classes. Each class owns a fill/stroke colour that
//! the object streams declare as style classes.

use crate::protocol::{Rgba, StreamStyle, StyleClass};

/// Fill alpha applied to every class colour (stroke is opaque).
pub const FILL_ALPHA: u8 = 0x80;

/// One of the ten detection classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Barrier,
    Bicycle,
    Bus,
    Car,
    ConstructionVehicle,
    Motorcycle,
    Pedestrian,
    TrafficCone,
    Trailer,
    Truck,
}

impl ObjectClass {
    /// Maps a dataset category name to its class.
    ///
    /// # Returns
    /// * `None` for categories outside the detection set (animals, debris, ...)
    pub fn from_category(category: &str) -> Option<Self> {
        match category {
            "movable_object.barrier" => Some(Self::Barrier),
            "vehicle.bicycle" => Some(Self::Bicycle),
            "vehicle.bus.bendy" | "vehicle.bus.rigid" => Some(Self::Bus),
            "vehicle.car" => Some(Self::Car),
            "vehicle.construction" => Some(Self::ConstructionVehicle),
            "vehicle.motorcycle" => Some(Self::Motorcycle),
            "human.pedestrian.adult"
            | "human.pedestrian.child"
            | "human.pedestrian.construction_worker"
            | "human.pedestrian.police_officer" => Some(Self::Pedestrian),
            "movable_object.trafficcone" => Some(Self::TrafficCone),
            "vehicle.trailer" => Some(Self::Trailer),
            "vehicle.truck" => Some(Self::Truck),
            _ => None,
        }
    }

    /// Class name as used in style selectors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Barrier => "barrier",
            Self::Bicycle => "bicycle",
            Self::Bus => "bus",
            Self::Car => "car",
            Self::ConstructionVehicle => "construction_vehicle",
            Self::Motorcycle => "motorcycle",
            Self::Pedestrian => "pedestrian",
            Self::TrafficCone => "traffic_cone",
            Self::Trailer => "trailer",
            Self::Truck => "truck",
        }
    }

    /// Base RGB colour of the class.
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::Barrier => [0x87, 0xCE, 0xEB],
            Self::Bicycle => [0xFF, 0x69, 0xB4],
            Self::Bus => [0xFF, 0x8C, 0x00],
            Self::Car => [0x00, 0xCE, 0xD1],
            Self::ConstructionVehicle => [0xFF, 0xD7, 0x00],
            Self::Motorcycle => [0xEE, 0x82, 0xEE],
            Self::Pedestrian => [0xFF, 0xA5, 0x00],
            Self::TrafficCone => [0xFF, 0x63, 0x47],
            Self::Trailer => [0x93, 0x70, 0xDB],
            Self::Truck => [0x32, 0xCD, 0x32],
        }
    }

    /// Typical object width in meters, used as trajectory stroke width.
    pub fn typical_width(&self) -> f32 {
        match self {
            Self::Barrier => 0.5,
            Self::Bicycle => 0.6,
            Self::Bus => 2.7,
            Self::Car => 1.8,
            Self::ConstructionVehicle | Self::Trailer | Self::Truck => 2.5,
            Self::Motorcycle => 0.8,
            Self::Pedestrian => 0.7,
            Self::TrafficCone => 0.3,
        }
    }

    /// Semi-transparent fill colour.
    pub fn fill_color(&self) -> Rgba {
        let [r, g, b] = self.color();
        [r, g, b, FILL_ALPHA]
    }

    /// Opaque stroke colour.
    pub fn stroke_color(&self) -> Rgba {
        let [r, g, b] = self.color();
        [r, g, b, 0xFF]
    }

    /// All classes, in declaration order.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Barrier,
            Self::Bicycle,
            Self::Bus,
            Self::Car,
            Self::ConstructionVehicle,
            Self::Motorcycle,
            Self::Pedestrian,
            Self::TrafficCone,
            Self::Trailer,
            Self::Truck,
        ]
    }

    /// One style class per object class, for stream metadata.
    pub fn style_classes() -> Vec<StyleClass> {
        Self::all()
            .into_iter()
            .map(|class| StyleClass {
                name: class.name().to_string(),
                style: StreamStyle {
                    fill_color: Some(class.fill_color()),
                    stroke_color: Some(class.stroke_color()),
                    ..StreamStyle::default()
                },
            })
            .collect()
    }
}

/// Stroke-only style classes for trajectory polylines, one per class.
pub fn trajectory_style_classes() -> Vec<StyleClass> {
    ObjectClass::all()
        .into_iter()
        .map(|class| StyleClass {
            name: class.name().to_string(),
            style: StreamStyle {
                stroke_color: Some(class.stroke_color()),
                stroke_width: Some(class.typical_width()),
                ..StreamStyle::default()
            },
        })
        .collect()
}
