//! The RTMP handshake (§4.7, §6): C0/S0/C1/S1/C2/S2, version byte 3, a u32
//! time, a u32 zero, and 1528 random bytes per side.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const VERSION: u8 = 3;
const RANDOM_LEN: usize = 1528;

/// Runs the server side of the handshake on an already-connected socket.
/// Returns once C2 has been verified; the connection is ready for chunk
/// traffic after this.
pub async fn perform<IO>(io: &mut IO) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut c0 = [0u8; 1];
    io.read_exact(&mut c0).await?;
    if c0[0] != VERSION {
        return Err(Error::protocol(format!("unsupported RTMP version {}", c0[0])));
    }

    let mut c1 = [0u8; 4 + 4 + RANDOM_LEN];
    io.read_exact(&mut c1).await?;
    let c1_time = u32::from_be_bytes(c1[0..4].try_into().unwrap());
    let c1_random = c1[8..].to_vec();

    let s1_time: u32 = 0;
    let mut s1_random = vec![0u8; RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut s1_random);

    io.write_all(&[VERSION]).await?;
    io.write_all(&s1_time.to_be_bytes()).await?;
    io.write_all(&0u32.to_be_bytes()).await?;
    io.write_all(&s1_random).await?;

    io.write_all(&c1_time.to_be_bytes()).await?;
    io.write_all(&s1_time.to_be_bytes()).await?;
    io.write_all(&c1_random).await?;
    io.flush().await?;

    let mut c2 = [0u8; 4 + 4 + RANDOM_LEN];
    io.read_exact(&mut c2).await?;
    let echoed_time2 = u32::from_be_bytes(c2[4..8].try_into().unwrap());
    if echoed_time2 != c1_time {
        return Err(Error::protocol("handshake C2 did not echo C1's time"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn completes_handshake_against_a_well_behaved_client() {
        let (mut server, mut client) = duplex(8192);

        let client_task = tokio::spawn(async move {
            client.write_all(&[VERSION]).await.unwrap();
            client.write_all(&111u32.to_be_bytes()).await.unwrap();
            client.write_all(&0u32.to_be_bytes()).await.unwrap();
            client.write_all(&vec![0u8; RANDOM_LEN]).await.unwrap();
            client.flush().await.unwrap();

            let mut s0 = [0u8; 1];
            client.read_exact(&mut s0).await.unwrap();
            assert_eq!(s0[0], VERSION);
            let mut s1 = [0u8; 4 + 4 + RANDOM_LEN];
            client.read_exact(&mut s1).await.unwrap();
            let s1_time = u32::from_be_bytes(s1[0..4].try_into().unwrap());
            let mut s2 = [0u8; 4 + 4 + RANDOM_LEN];
            client.read_exact(&mut s2).await.unwrap();

            client.write_all(&s1_time.to_be_bytes()).await.unwrap();
            client.write_all(&111u32.to_be_bytes()).await.unwrap();
            client.write_all(&s1[8..]).await.unwrap();
            client.flush().await.unwrap();
        });

        perform(&mut server).await.unwrap();
        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_version() {
        let (mut server, mut client) = duplex(64);
        tokio::spawn(async move {
            client.write_all(&[9]).await.unwrap();
            client.flush().await.unwrap();
        });
        let err = perform(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }
}
