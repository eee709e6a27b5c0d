pub mod collector;
pub mod config;
pub mod decoder;
pub mod downstream;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod ids;
pub mod lexicon;
pub mod metadata;
pub mod session;
pub mod transport;

pub use collector::{Collector, CollectorError, CollectorState, CollectorStatus};
pub use config::{CircuitConfig, CollectorConfig, GatewayConfig};
pub use decoder::{decode, DecodedFrame, FrameKind, MappingStatus};
pub use downstream::{DownstreamMessage, KartingDataPayload, StatusPayload};
pub use error::{classify_text, SendFailure};
pub use fanout::{ChannelSink, FanoutManager, SinkError, SubscriberId, SubscriberSink};
pub use gateway::{Gateway, GatewayError};
pub use ids::{CircuitId, ColumnIndex, ColumnIndexOutOfRange, DriverId};
pub use metadata::{mapping_to_wire, LoggingMetadataStore, MetadataError, MetadataStore};
pub use session::{
    ApplyOutcome, CellValue, DriverRecord, Mapping, PersistenceDirective, RawTable, SessionSnapshot,
    SessionState,
};
pub use transport::{TransportError, UpstreamTransport, WebSocketConnection, WebSocketTransport};
