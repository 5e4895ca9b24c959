pub mod queries;
pub mod routes;

pub use queries::{
    CertificationItem, GetCertificationError, GetCertificationQuery, SearchCertificationsError,
    SearchCertificationsQuery, SearchCertificationsResponse,
};
pub use routes::certifications_routes;
