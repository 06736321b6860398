//! Column names of the listing dataset and of derived features.

/// Sale price, the regression target.
pub const PRICE: &str = "Price";
/// Habitable surface in square meters.
pub const LIVING_AREA: &str = "LivingArea";
/// Postal code of the property.
pub const POSTAL_CODE: &str = "PostalCode";
/// Year the building was constructed.
pub const CONSTRUCTION_YEAR: &str = "ConstructionYear";
/// Kitchen equipment level.
pub const KITCHEN: &str = "Kitchen";
/// Heating energy source.
pub const HEATING: &str = "Heating";
/// Condition of the building.
pub const STATE_OF_BUILDING: &str = "StateOfBuilding";
/// Property type code (1 = house).
pub const TYPE_OF_PROPERTY: &str = "TypeOfProperty";
/// Sale type code (2 = life annuity sale).
pub const TYPE_OF_SALE: &str = "TypeOfSale";
/// Total plot surface.
pub const SURFACE_OF_GOOD: &str = "SurfaceOfGood";
/// Listing identifier.
pub const PROPERTY_ID: &str = "PropertyId";

/// Boolean amenity flags summed into [`AMENITIES`].
pub const AMENITY_FLAGS: [&str; 4] = ["Openfire", "Terrace", "SwimmingPool", "Furnished"];

/// Derived: count of amenities plus kitchen and heating codes.
pub const AMENITIES: &str = "Amenities";
/// Derived: binned living area code.
pub const LIVING_AREA_CATEGORY: &str = "LivingAreaCategory";
/// Derived: years since construction.
pub const BUILDING_AGE: &str = "BuildingAge";
/// Derived: mean price in the listing's postal code.
pub const PRICE_MEAN_BY_POSTAL: &str = "Price_mean/PostalCode";
/// Derived: mean price per square meter in the listing's postal code.
pub const PRICE_PER_SQM_BY_POSTAL: &str = "Price/SQMeter/PostalCode";

/// Columns dropped before modeling unless configured otherwise.
pub const DEFAULT_DROPPED: [&str; 4] = ["Url", PROPERTY_ID, TYPE_OF_SALE, "SubtypeOfProperty"];

/// Carries listing identifiers through row filtering; never a feature.
pub(crate) const ROW_ID: &str = "__row_id";
