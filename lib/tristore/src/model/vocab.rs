//! Ready to use IRI constants for the vocabularies the store recognizes.

pub mod xsd {
    //! [XML Schema datatypes](https://www.w3.org/TR/xmlschema11-2/) IRIs.

    /// Boolean true/false values.
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    /// Gregorian calendar dates.
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    /// Date and time instants.
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    /// Arbitrary-precision decimal numbers.
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    /// 64-bit floating point numbers.
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    /// 32-bit floating point numbers.
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    /// Arbitrary-size integer numbers.
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    /// Character strings.
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
}
