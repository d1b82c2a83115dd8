// The server request dispatcher and everything a request touches on its way
// through: the opcode enumeration, the table of per-opcode policy bits and
// handlers, connection state, the reply/error/abort frames, and the outbound
// method-callout pool. The dispatcher is transport-agnostic: it sees a
// request id, an opcode and a payload, and writes frames into whatever peer
// the connection carries.

mod conn;
mod dispatch;
mod frame;
mod handlers;
mod method_pool;
mod opcode;
mod table;

pub use conn::{ConnStatus, Connection, Peer, QueuePeer, Session};
pub use dispatch::{request_worker, DispatchStatus, Dispatcher, RequestJob, ServerDeps, ServerStats};
pub use frame::{ErrorCode, Frame, FrameBody, HandshakeReply, HandshakeRequest, SERVER_VERSION};
pub use method_pool::{Dialer, LoopbackDialer, MethodConnection, MethodPool, MethodTransport};
pub use opcode::Opcode;
pub use table::{ActionAttrs, RequestDescriptor, RequestTable, ServiceError};
