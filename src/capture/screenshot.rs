//! Screen capture using the Windows Graphics Capture API.

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING, D3D11CreateDevice, ID3D11Device,
    ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Gdi::{MONITOR_DEFAULTTOPRIMARY, MonitorFromPoint};
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
};
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::core::Interface;

/// Maximum wait for the first frame of a capture session.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Captures the primary monitor.
///
/// The D3D11 device and capture item are created once; each capture opens a
/// short-lived frame pool and session.
pub struct MonitorCapturer {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    d3d_device: IDirect3DDevice,
    item: GraphicsCaptureItem,
}

impl MonitorCapturer {
    pub fn primary() -> Result<Self> {
        let (device, context) = create_d3d11_device()?;
        let d3d_device = create_direct3d_device(&device)?;
        let item = create_monitor_item()?;
        let size = item.Size()?;
        log::debug!("Monitor capture item: {}x{}", size.Width, size.Height);
        Ok(Self {
            device,
            context,
            d3d_device,
            item,
        })
    }

    /// Captures one frame as RGBA.
    pub fn capture(&self) -> Result<RgbaImage> {
        let size = self.item.Size()?;
        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &self.d3d_device,
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            1,
            size,
        )?;
        let session = frame_pool.CreateCaptureSession(&self.item)?;

        let frame_arrived = Arc::new(AtomicBool::new(false));
        let frame_arrived_clone = frame_arrived.clone();
        frame_pool.FrameArrived(&TypedEventHandler::new(
            move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
                frame_arrived_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
        ))?;

        session.StartCapture()?;

        let start = Instant::now();
        while !frame_arrived.load(Ordering::SeqCst) {
            if start.elapsed() > FRAME_TIMEOUT {
                let _ = session.Close();
                let _ = frame_pool.Close();
                return Err(anyhow!("Timeout waiting for frame"));
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let frame = frame_pool.TryGetNextFrame()?;
        let access: IDirect3DDxgiInterfaceAccess = frame.Surface()?.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };
        let img = self.read_texture(&texture);

        session.Close()?;
        frame_pool.Close()?;
        img
    }

    /// Copies a GPU texture into CPU memory and converts BGRA to RGBA.
    fn read_texture(&self, texture: &ID3D11Texture2D) -> Result<RgbaImage> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.Width,
            Height: desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: desc.Format,
            SampleDesc: desc.SampleDesc,
            Usage: D3D11_USAGE_STAGING,
            BindFlags: Default::default(),
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: Default::default(),
        };

        let staging = unsafe {
            let mut staging: Option<ID3D11Texture2D> = None;
            self.device
                .CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
            staging.ok_or_else(|| anyhow!("Failed to create staging texture"))?
        };
        let staging_resource = staging.cast::<ID3D11Resource>()?;

        unsafe {
            self.context
                .CopyResource(&staging_resource, &texture.cast::<ID3D11Resource>()?);
        }

        let mapped = unsafe {
            let mut mapped = Default::default();
            self.context
                .Map(&staging_resource, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
            mapped
        };

        let (width, height) = (desc.Width, desc.Height);
        let row_pitch = mapped.RowPitch as usize;
        let src = unsafe {
            std::slice::from_raw_parts(mapped.pData as *const u8, row_pitch * height as usize)
        };

        let img: RgbaImage = ImageBuffer::from_fn(width, height, |x, y| {
            let offset = y as usize * row_pitch + x as usize * 4;
            // BGRA -> RGBA
            Rgba([src[offset + 2], src[offset + 1], src[offset], src[offset + 3]])
        });

        unsafe {
            self.context.Unmap(&staging_resource, 0);
        }

        Ok(img)
    }
}

fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("Failed to create D3D11 device"))?,
        context.ok_or_else(|| anyhow!("Failed to create D3D11 context"))?,
    ))
}

/// Wraps the D3D11 device for the capture API.
fn create_direct3d_device(device: &ID3D11Device) -> Result<IDirect3DDevice> {
    let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice = device.cast()?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
    inspectable
        .cast()
        .context("Failed to cast to IDirect3DDevice")
}

fn create_monitor_item() -> Result<GraphicsCaptureItem> {
    let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
    let interop: IGraphicsCaptureItemInterop = unsafe {
        windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
            .context("Failed to get IGraphicsCaptureItemInterop")?
    };

    let monitor = unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
    unsafe {
        interop
            .CreateForMonitor(monitor)
            .context("Failed to create capture item for monitor")
    }
}
