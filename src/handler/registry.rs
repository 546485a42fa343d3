//! Registry routing inbound frames to command handlers

use std::collections::HashMap;

use rentbox_protocol::Frame;
use tracing::{debug, warn};

use super::{
    CheckHandler, CommandHandler, HandlerContext, PopupIndexHandler, PopupSnHandler,
    ReturnHandler, WifiScanHandler,
};

/// Maps command code to handler and dispatches inbound frames
///
/// Explicitly constructed and injected (no global handler table) so tests
/// can build a registry around their own stores.
pub struct CommandRegistry {
    handlers: HashMap<u8, Box<dyn CommandHandler>>,
    ctx: HandlerContext,
}

impl CommandRegistry {
    /// Create an empty registry around the given shared services
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            handlers: HashMap::new(),
            ctx,
        }
    }

    /// Create a registry with every production handler registered
    pub fn with_default_handlers(ctx: HandlerContext) -> Self {
        let mut registry = Self::new(ctx);
        registry.register(Box::new(CheckHandler));
        registry.register(Box::new(PopupSnHandler));
        registry.register(Box::new(PopupIndexHandler));
        registry.register(Box::new(ReturnHandler));
        registry.register(Box::new(WifiScanHandler));
        registry
    }

    /// Register a handler under its command code
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) {
        debug!(
            command = handler.name(),
            code = format!("0x{:02X}", handler.code()),
            "registered handler"
        );
        self.handlers.insert(handler.code(), handler);
    }

    /// Route a validated frame to its handler
    ///
    /// Unknown command codes are logged and ignored, never fatal.
    pub fn dispatch(&self, device_id: &str, frame: &Frame) -> bool {
        let handler = match self.handlers.get(&frame.command) {
            Some(handler) => handler,
            None => {
                warn!(
                    device = device_id,
                    code = format!("0x{:02X}", frame.command),
                    "no handler registered for command"
                );
                return false;
            }
        };

        debug!(
            device = device_id,
            command = handler.name(),
            "dispatching frame"
        );
        handler.handle(device_id, frame, &self.ctx);
        true
    }

    pub fn has_handler(&self, code: u8) -> bool {
        self.handlers.contains_key(&code)
    }

    pub fn registered_commands(&self) -> Vec<u8> {
        self.handlers.keys().copied().collect()
    }
}
