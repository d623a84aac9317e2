// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! stages_and_states is the resource/state coordination layer that sits between
application code and a native graphics driver.

It is not a scene graph, a renderer or an asset pipeline. It owns the part of a
rendering stack that is easy to get subtly wrong and miserable to debug: which
copy of a resource's bytes is authoritative, who is allowed to touch a resource
while the GPU might be reading it, and which driver objects have to exist
before a draw call can be issued.

# The model

| Concept | Type | What it settles |
|---------|------|-----------------|
| Format algebra | [`formats`] | Byte layouts of pixels, vertices and shader pins, parsed from compact descriptors (`"R.UN8 G.UN8 B.UN8 A.UN8"`), classified against hardware-friendly common layouts |
| Typeless resources | [`resources::TypelessBuffer`], [`resources::TypelessTexture2D`] | Raw bytes with dual residency (system RAM and/or device memory) and transactional map/unmap access |
| Views | [`resources`] | Typed, range-scoped windows over one resource; reference-counted so the resource disposes with its last view |
| State objects | [`states`] | Immutable-once-interned descriptors, globally deduplicated through an explicit [`states::InternPool`] |
| Device | [`GraphicsDevice`] | The locked, stateful context: re-entrant `enter`/`exit`, per-stage binding with compare-and-swap lock discipline, draw dispatch |

The driver underneath is a trait surface ([`driver::DriverDevice`]) consumed
purely through opaque handles; [`driver::headless`] ships a pure-software
implementation that the test suite runs against.

# A frame

```
use std::sync::Arc;
use stages_and_states::driver::headless::HeadlessDevice;
use stages_and_states::states::InternPool;
use stages_and_states::GraphicsDevice;

let device = GraphicsDevice::new(
    Arc::new(HeadlessDevice::new()),
    Arc::new(InternPool::new()),
)?;
{
    let _frame = device.lock()?;
    // bind states, shaders and geometry, then draw
}
# Ok::<(), stages_and_states::GraphicsError>(())
```

Everything that mutates device state must happen between `enter` and `exit`
(or inside a [`DeviceLock`]); calls outside the lock fail fast rather than
race. Bindings survive across frames, and the device guarantees that the set
of locks it holds is exactly the set of things currently bound.
*/

pub mod common;
pub mod device;
pub mod driver;
pub mod error;
pub mod formats;
pub mod resources;
pub mod shaders;
pub mod states;
pub mod sync;

pub use device::{DeviceLock, DevicePerformance, GraphicsDevice, StateStatistics};
pub use error::GraphicsError;

pub use glam;
