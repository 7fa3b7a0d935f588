//! Wirebind core: declarative REST endpoint descriptors, request assembly and
//! response decoding.
//!
//! Everything here is execution-model agnostic. The blocking and
//! non-blocking executors in `wirebind-client` drive the same functions.

pub mod arg;
pub mod assemble;
pub mod body;
pub mod cache;
pub mod decode;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod escape;
pub mod length;
pub mod metadata;
pub mod serializer;
pub mod template;
pub mod wire;

pub use arg::Arg;
pub use assemble::{assemble, AssemblyError};
pub use body::{BinaryData, ByteReader, ByteStream, RequestBody, ResponseBody};
pub use cache::DescriptorCache;
pub use decode::{decode, Consumption, DecodeError, DecodeStrategy, Decoded, Page, Payload};
pub use descriptor::{EndpointDescriptor, OperationId, RegistrationError, ReturnShape};
pub use envelope::{Envelope, EnvelopeArity, EnvelopeRegistry};
pub use error::{ConstructionError, ErrorRegistry, RawResponse, ServiceError, GENERIC_ERROR_TYPE};
pub use escape::{escape, escape_utf16, EscapeError, EscapeProfile};
pub use length::{LengthMismatch, LengthValidatingReader, LengthValidatingStream};
pub use metadata::{BodyType, InterfaceMetadata, OperationMetadata, ParamRole, ReturnType, WireType};
pub use serializer::{Encoding, JsonSerializer, SerdeError, Serializer};
pub use wire::{HttpRequest, HttpResponse, RequestSnapshot, ResponseHead};
