use crate::error::PsshError;
use crate::types::SystemId;

const BOX_TYPE: &[u8; 4] = b"pssh";

/**
    Parsed ISOBMFF `pssh` box.

    Layout:
      box_size: u32 BE (whole box), box_type: "pssh", version: u8 (0 or 1),
      flags: u24, system_id: 16 bytes,
      v1 only: key_id_count: u32 BE followed by key_id_count * 16 bytes,
      data_size: u32 BE, data: data_size bytes
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub system_id: SystemId,
    /**
        Key IDs from the box header. Always empty for v0 boxes.
    */
    pub key_ids: Vec<[u8; 16]>,
    /**
        Scheme-specific payload, e.g. a serialized WidevinePsshData.
    */
    pub data: Vec<u8>,
}

impl PsshBox {
    /**
        Build a box for `system_id` carrying `data`. Uses version 1 when
        key IDs are given.
    */
    pub fn new(system_id: SystemId, key_ids: Vec<[u8; 16]>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            version: u8::from(!key_ids.is_empty()),
            flags: [0; 3],
            system_id,
            key_ids,
            data: data.into(),
        }
    }

    /**
        Parse a complete box. Trailing bytes past `box_size` are an error,
        as is any field running past it.
    */
    pub fn from_bytes(input: &[u8]) -> Result<Self, PsshError> {
        let mut outer = Cursor::new(input);
        let box_size = outer.u32("box_size")? as usize;
        if box_size != input.len() {
            return Err(malformed(format!(
                "box_size {box_size} does not match input length {}",
                input.len()
            )));
        }

        let mut cur = Cursor::new(&input[4..]);
        if cur.take(4, "box_type")? != BOX_TYPE {
            return Err(malformed("box_type is not 'pssh'".into()));
        }

        let version = cur.u8("version")?;
        if version > 1 {
            return Err(malformed(format!("unsupported version {version}")));
        }
        let flags = cur.array::<3>("flags")?;
        let system_id = SystemId::from_bytes(cur.array::<16>("system_id")?);

        let mut key_ids = Vec::new();
        if version == 1 {
            let count = cur.u32("key_id_count")? as usize;
            for _ in 0..count {
                key_ids.push(cur.array::<16>("key_id")?);
            }
        }

        let data_size = cur.u32("data_size")? as usize;
        let data = cur.take(data_size, "data")?.to_vec();

        if !cur.is_empty() {
            return Err(malformed(format!("{} trailing bytes", cur.remaining())));
        }

        Ok(Self {
            version,
            flags,
            system_id,
            key_ids,
            data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(32 + self.key_ids.len() * 16 + self.data.len());
        body.extend_from_slice(BOX_TYPE);
        body.push(self.version);
        body.extend_from_slice(&self.flags);
        body.extend_from_slice(&self.system_id.to_bytes());
        if self.version == 1 {
            body.extend_from_slice(&(self.key_ids.len() as u32).to_be_bytes());
            for kid in &self.key_ids {
                body.extend_from_slice(kid);
            }
        }
        body.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.data);

        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /**
        Extract the scheme-specific payload from `atom` if it is a well formed
        `pssh` box for `system_id`.

        Returns `None` when the bytes are not a `pssh` box or the box belongs
        to another system. Callers treat that as "use the bytes unchanged".
    */
    pub fn scheme_specific_data(atom: &[u8], system_id: SystemId) -> Option<Vec<u8>> {
        let pssh = Self::from_bytes(atom).ok()?;
        (pssh.system_id == system_id).then_some(pssh.data)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8], PsshError> {
        if n > self.remaining() {
            return Err(malformed(format!("truncated {field}")));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], PsshError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &str) -> Result<u8, PsshError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &str) -> Result<u32, PsshError> {
        Ok(u32::from_be_bytes(self.array::<4>(field)?))
    }
}

fn malformed(msg: String) -> PsshError {
    PsshError::Malformed(msg)
}
