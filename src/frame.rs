//! Routing-frame codec
//!
//! Every request crossing a transport buffer carries a routing frame pushed
//! on top of the payload message: dispatch mode, the two scopes and the route
//! key, encoded little-endian. The scope order is asymmetric on purpose: the
//! sender writes its remote scope first, the receiver reads that first scope
//! as its *local* scope, so "local scope" always means "this side".

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::domain_types::{ClusterNodeId, EndpointAddress, EndpointScope, Route};
use crate::message::Message;

/// Decode failures for the routing frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The message carried no frame to decode.
    #[error("message contains no routing frame")]
    MissingFrame,

    /// The frame ended before a field was complete.
    #[error("routing frame truncated: needed {needed} more bytes")]
    Truncated {
        /// How many bytes the next field still required.
        needed: usize,
    },

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean value {value:#04x} in routing frame")]
    InvalidBool {
        /// The offending byte.
        value: u8,
    },

    /// The route key was not valid UTF-8.
    #[error("route key is not valid utf-8")]
    InvalidRoute {
        /// The underlying decoding failure.
        #[source]
        source: std::str::Utf8Error,
    },

    /// Bytes remained after the last field.
    #[error("routing frame has {remaining} trailing bytes")]
    TrailingBytes {
        /// How many bytes were left over.
        remaining: usize,
    },
}

/// The decoded (or to-be-encoded) routing frame, seen from one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoutingFrame {
    /// Publish fan-out when true, p2p when false.
    pub publish: bool,
    /// Sender's assertion that the dispatch stays on the local end point.
    pub local_dispatch: bool,
    /// The other side of the call.
    pub remote_scope: EndpointScope,
    /// This side of the call.
    pub local_scope: EndpointScope,
    /// The route key being dispatched.
    pub route: Route,
}

/// Encodes the frame on top of `message`.
///
/// Writes the sender's remote scope before its local scope; see the module
/// docs for why decode reads them back swapped.
pub(crate) fn encode(frame: &RoutingFrame, message: &mut Message) {
    let mut buf = BytesMut::with_capacity(encoded_len(frame));
    buf.put_u8(u8::from(frame.publish));
    buf.put_u8(u8::from(frame.local_dispatch));
    put_scope(&mut buf, &frame.remote_scope);
    put_scope(&mut buf, &frame.local_scope);
    put_bytes(&mut buf, frame.route.as_str().as_bytes());
    message.push_frame(buf.freeze());
}

/// Pops and decodes the routing frame from `message`.
///
/// The first scope on the wire was the sender's remote scope, which is this
/// side's local scope; the second becomes the remote scope.
pub(crate) fn decode(message: &mut Message) -> Result<RoutingFrame, FrameError> {
    let frame = message.pop_frame().ok_or(FrameError::MissingFrame)?;
    let mut buf = frame;

    let publish = get_bool(&mut buf)?;
    let local_dispatch = get_bool(&mut buf)?;
    let local_scope = get_scope(&mut buf)?;
    let remote_scope = get_scope(&mut buf)?;
    let route = get_route(&mut buf)?;

    if buf.has_remaining() {
        return Err(FrameError::TrailingBytes {
            remaining: buf.remaining(),
        });
    }

    Ok(RoutingFrame {
        publish,
        local_dispatch,
        remote_scope,
        local_scope,
        route,
    })
}

fn encoded_len(frame: &RoutingFrame) -> usize {
    let scope_len = |scope: &EndpointScope| {
        4 + scope.address().as_bytes().len() + 4 + scope.cluster_node_id().as_bytes().len() + 8
    };
    2 + scope_len(&frame.remote_scope)
        + scope_len(&frame.local_scope)
        + 4
        + frame.route.as_str().len()
}

fn put_scope(buf: &mut BytesMut, scope: &EndpointScope) {
    put_bytes(buf, scope.address().as_bytes());
    put_bytes(buf, scope.cluster_node_id().as_bytes());
    buf.put_i64_le(scope.seq());
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn get_scope(buf: &mut Bytes) -> Result<EndpointScope, FrameError> {
    let address = EndpointAddress::new(get_bytes(buf)?);
    let cluster_node_id = ClusterNodeId::new(get_bytes(buf)?);
    if buf.remaining() < 8 {
        return Err(FrameError::Truncated {
            needed: 8 - buf.remaining(),
        });
    }
    let seq = buf.get_i64_le();
    Ok(EndpointScope::new(address, cluster_node_id, seq))
}

fn get_route(buf: &mut Bytes) -> Result<Route, FrameError> {
    let bytes = get_bytes(buf)?;
    let route = std::str::from_utf8(&bytes)
        .map_err(|source| FrameError::InvalidRoute { source })?;
    Ok(Route::new(route))
}

fn get_bytes(buf: &mut Bytes) -> Result<Bytes, FrameError> {
    if buf.remaining() < 4 {
        return Err(FrameError::Truncated {
            needed: 4 - buf.remaining(),
        });
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(FrameError::Truncated {
            needed: len - buf.remaining(),
        });
    }
    Ok(buf.copy_to_bytes(len))
}

fn get_bool(buf: &mut Bytes) -> Result<bool, FrameError> {
    if !buf.has_remaining() {
        return Err(FrameError::Truncated { needed: 1 });
    }
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(FrameError::InvalidBool { value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scope(address: &str, node: u64, seq: i64) -> EndpointScope {
        EndpointScope::new(address.into(), ClusterNodeId::from_counter(node), seq)
    }

    #[test]
    fn round_trip_swaps_scopes() {
        let frame = RoutingFrame {
            publish: true,
            local_dispatch: false,
            remote_scope: scope("target", 7, 3),
            local_scope: scope("origin", 1, 99),
            route: Route::from("orders/created"),
        };
        let mut message = Message::from(Bytes::from_static(b"payload"));

        encode(&frame, &mut message);
        let decoded = decode(&mut message).unwrap();

        assert_eq!(decoded.publish, frame.publish);
        assert_eq!(decoded.local_dispatch, frame.local_dispatch);
        assert_eq!(decoded.route, frame.route);
        // The receiver's local side is what the sender called remote.
        assert_eq!(decoded.local_scope, frame.remote_scope);
        assert_eq!(decoded.remote_scope, frame.local_scope);
        // The payload underneath is untouched.
        assert_eq!(message, Message::from(Bytes::from_static(b"payload")));
    }

    #[test]
    fn decode_rejects_empty_message() {
        let mut message = Message::new();
        assert!(matches!(
            decode(&mut message),
            Err(FrameError::MissingFrame)
        ));
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let frame = RoutingFrame {
            publish: false,
            local_dispatch: false,
            remote_scope: scope("a", 1, 0),
            local_scope: scope("b", 2, 0),
            route: Route::from("r"),
        };
        let mut message = Message::new();
        encode(&frame, &mut message);

        let encoded = message.pop_frame().unwrap();
        let mut truncated = Message::new();
        truncated.push_frame(encoded.slice(..encoded.len() - 3));

        assert!(matches!(
            decode(&mut truncated),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_rejects_bad_boolean() {
        let mut message = Message::new();
        message.push_frame(Bytes::from_static(&[2, 0]));
        assert!(matches!(
            decode(&mut message),
            Err(FrameError::InvalidBool { value: 2 })
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let frame = RoutingFrame {
            publish: false,
            local_dispatch: true,
            remote_scope: scope("a", 1, 0),
            local_scope: scope("b", 2, 0),
            route: Route::from("r"),
        };
        let mut message = Message::new();
        encode(&frame, &mut message);

        let mut padded = BytesMut::from(&message.pop_frame().unwrap()[..]);
        padded.put_u8(0xff);
        let mut message = Message::new();
        message.push_frame(padded.freeze());

        assert!(matches!(
            decode(&mut message),
            Err(FrameError::TrailingBytes { remaining: 1 })
        ));
    }

    proptest! {
        #[test]
        fn round_trip_any_frame(
            publish in any::<bool>(),
            local_dispatch in any::<bool>(),
            remote_addr in ".*",
            remote_node in any::<u64>(),
            remote_seq in any::<i64>(),
            local_addr in ".*",
            local_node in any::<u64>(),
            local_seq in any::<i64>(),
            route in ".*",
        ) {
            let frame = RoutingFrame {
                publish,
                local_dispatch,
                remote_scope: scope(&remote_addr, remote_node, remote_seq),
                local_scope: scope(&local_addr, local_node, local_seq),
                route: Route::new(route),
            };
            let mut message = Message::new();
            encode(&frame, &mut message);
            let decoded = decode(&mut message).unwrap();

            prop_assert_eq!(decoded.publish, frame.publish);
            prop_assert_eq!(decoded.local_dispatch, frame.local_dispatch);
            prop_assert_eq!(decoded.route, frame.route);
            prop_assert_eq!(decoded.local_scope, frame.remote_scope);
            prop_assert_eq!(decoded.remote_scope, frame.local_scope);
            prop_assert!(message.is_empty());
        }
    }
}
