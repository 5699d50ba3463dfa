use busrpc::Client;

const SERVICE: &str = "busrpc.echo";
const METHOD: &str = "busrpc.system.echo";

fn main() -> Result<(), String> {
    let conf = busrpc::init::init()?;
    let conf = conf.into_shared();

    let client = Client::connect(conf.clone())?;

    let ses = client.session(SERVICE);

    let params = vec!["hello", "world", "again"];

    ses.connect()?; // optional

    // Request -> Receive example
    let mut req = ses.request(METHOD, params)?;

    while let Some(resp) = req.recv_with_timeout(10)? {
        println!("Response: {}", resp.dump());
    }

    // Iterator example
    for resp in client.sendrecv(SERVICE, "busrpc.echo.echo", vec!["one", "two"])? {
        println!("Response: {}", resp?.dump());
    }

    // Single-response example
    if let Some(resp) = client
        .session(SERVICE)
        .request("busrpc.echo.reverse", "sdrawkcab")?
        .first()?
    {
        println!("Reversed: {}", resp.dump());
    }

    ses.disconnect()?; // only required if ses.connect() was called

    Ok(())
}
