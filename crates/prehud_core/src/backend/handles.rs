//! Opaque backend handles and resource shape descriptors
//!
//! Handles are plain integers assigned by the host graphics layer. Equality is
//! the only identity test the selector performs; contents are never inspected.

use ash::vk;
use serde::{Deserialize, Serialize};

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle
            pub const NULL: Self = Self(0);

            /// Whether this is the null handle
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// `Some(self)` unless null
            pub const fn non_null(self) -> Option<Self> {
                if self.is_null() {
                    None
                } else {
                    Some(self)
                }
            }
        }
    };
}

opaque_handle!(
    /// Handle to a GPU resource allocation
    Resource
);

opaque_handle!(
    /// Handle to a view onto a GPU resource
    ResourceView
);

opaque_handle!(
    /// Handle to the command-recording context a callback runs in
    CommandList
);

/// Resource dimensionality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Unknown or destroyed resource
    #[default]
    Unknown,
    /// Linear buffer
    Buffer,
    /// 1D texture
    Texture1d,
    /// 2D texture (render targets, depth buffers)
    Texture2d,
    /// 3D texture
    Texture3d,
}

/// Shape descriptor of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDesc {
    /// Dimensionality
    pub kind: ResourceKind,
    /// Width and height in texels
    pub extent: vk::Extent2D,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Texel format
    pub format: vk::Format,
}

impl Default for ResourceDesc {
    fn default() -> Self {
        Self {
            kind: ResourceKind::Unknown,
            extent: vk::Extent2D { width: 0, height: 0 },
            samples: vk::SampleCountFlags::TYPE_1,
            format: vk::Format::UNDEFINED,
        }
    }
}

impl ResourceDesc {
    /// Single-sampled 2D texture
    pub fn texture_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            kind: ResourceKind::Texture2d,
            extent: vk::Extent2D { width, height },
            samples: vk::SampleCountFlags::TYPE_1,
            format,
        }
    }

    /// Same descriptor with a different sample count
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Whether this is a 2D texture
    pub fn is_texture_2d(&self) -> bool {
        self.kind == ResourceKind::Texture2d
    }

    /// Number of samples per texel (at least 1)
    pub fn sample_count(&self) -> u32 {
        self.samples.as_raw().max(1)
    }

    /// Whether the resource is multisampled
    pub fn is_multisampled(&self) -> bool {
        self.sample_count() > 1
    }

    /// Texel area
    pub fn area(&self) -> u64 {
        u64::from(self.extent.width) * u64::from(self.extent.height)
    }

    /// Whether width and height are both non-zero
    pub fn has_extent(&self) -> bool {
        self.extent.width != 0 && self.extent.height != 0
    }

    /// Whether this is a 2D texture with exactly the given extent
    pub fn matches_extent(&self, extent: vk::Extent2D) -> bool {
        self.is_texture_2d() && self.extent.width == extent.width && self.extent.height == extent.height
    }
}
