pub mod clip_repo;
pub mod lease_repo;
pub mod session_repo;

pub use clip_repo::ClipRepo;
pub use lease_repo::LeaseRepo;
pub use session_repo::SessionRepo;
