//! Allocation and lifecycle services for streams.

mod allocator;
mod lifecycle;

pub use allocator::{
    Allocation, AllocatorError, AllocatorResult, InFlightReservations, ReservationHold,
    StreamAllocator,
};
pub use lifecycle::{
    CreateStreamRequest, LifecycleError, LifecycleResult, StreamChanges, StreamLifecycleService,
};
