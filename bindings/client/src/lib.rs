mod checks;
mod client;
mod response;
mod transport;

pub mod prelude {
    pub use crate::checks::{json_path_is, status_is};
    pub use crate::client::{HttpClient, RequestBuilder};
    pub use crate::response::{HttpResponse, NO_RESPONSE_STATUS};
    pub use crate::transport::{
        HttpRequest, Method, ReqwestTransport, Transport, TransportResponse, DEFAULT_TIMEOUT,
    };
}
