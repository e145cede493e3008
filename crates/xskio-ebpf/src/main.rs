#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::XskMap,
    programs::XdpContext,
};
use aya_log_ebpf::trace;

/// Sockets by queue id, filled in from userspace.
#[map]
static XSKS_MAP: XskMap = XskMap::with_max_entries(64, 0);

#[xdp]
pub fn xskio(ctx: XdpContext) -> u32 {
    let queue_id = ctx.queue_id();

    // Queues without a socket keep going up the normal stack.
    match XSKS_MAP.redirect(queue_id, xdp_action::XDP_PASS as u64) {
        Ok(action) => action,
        Err(_) => {
            trace!(&ctx, "no socket on queue {}", queue_id);
            xdp_action::XDP_PASS
        }
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
